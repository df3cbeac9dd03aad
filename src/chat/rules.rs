//! Keyword rules that decide whether a message asks for a chart or table,
//! and which statistic it is about.

use super::VizType;

/// Trigger words in priority order; the first one present wins.
const TRIGGERS: &[(&str, VizType)] = &[
    ("plot", VizType::Chart),
    ("chart", VizType::Chart),
    ("graph", VizType::Chart),
    ("visualize", VizType::Chart),
    ("visualise", VizType::Chart),
    ("table", VizType::Table),
];

/// Maps keywords to a column of the statistics table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticRule {
    pub column: String,
    pub keywords: Vec<String>,
}

impl StatisticRule {
    pub fn new(column: &str, keywords: &[&str]) -> Self {
        Self {
            column: column.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualizationIntent {
    pub viz_type: VizType,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartIntent {
    None,
    /// A chart was requested without naming a statistic.
    AskWhichStatistic(VizType),
    /// A statistic was mentioned without asking for a chart.
    StatisticOnly { column: String },
    Visualization(VisualizationIntent),
}

#[derive(Debug, Clone)]
pub struct ChartRules {
    statistics: Vec<StatisticRule>,
}

impl ChartRules {
    pub fn new(statistics: Vec<StatisticRule>) -> Self {
        Self { statistics }
    }

    pub fn statistics(&self) -> &[StatisticRule] {
        &self.statistics
    }

    pub fn trigger(&self, text: &str) -> Option<VizType> {
        let normalized = normalize(text);
        TRIGGERS
            .iter()
            .find(|(keyword, _)| contains_phrase(&normalized, keyword))
            .map(|(_, viz)| *viz)
    }

    pub fn statistic(&self, text: &str) -> Option<&StatisticRule> {
        let normalized = normalize(text);
        self.statistics.iter().find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| contains_phrase(&normalized, &normalize(keyword)))
        })
    }

    /// Checks the user's own wording first and the rewritten query second.
    pub fn classify(&self, original: &str, rewritten: &str) -> ChartIntent {
        let trigger = self.trigger(original).or_else(|| self.trigger(rewritten));
        let statistic = self
            .statistic(original)
            .or_else(|| self.statistic(rewritten));

        match (trigger, statistic) {
            (Some(viz_type), Some(rule)) => ChartIntent::Visualization(VisualizationIntent {
                viz_type,
                column: rule.column.clone(),
            }),
            (Some(viz_type), None) => ChartIntent::AskWhichStatistic(viz_type),
            (None, Some(rule)) => ChartIntent::StatisticOnly {
                column: rule.column.clone(),
            },
            (None, None) => ChartIntent::None,
        }
    }
}

// Lowercase alphanumeric tokens joined by single spaces, padded on both ends.
fn normalize(text: &str) -> String {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", tokens.join(" "))
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let phrase = phrase.trim();
    !phrase.is_empty() && normalized.contains(&format!(" {} ", phrase))
}
