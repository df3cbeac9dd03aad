use std::sync::Arc;

use crate::chat::exact_match::ExactAnswers;
use crate::chat::rewriter::QueryRewriter;
use crate::chat::rules::ChartRules;
use crate::chat::synthesizer::{AnswerSynthesizer, SynthesizerOptions};
use crate::chat::ChatPipeline;
use crate::core::config::{AppPaths, EmbeddingProviderKind, Settings, SweepMode};
use crate::history::HistoryStore;
use crate::knowledge::{load_knowledge, StatisticsTable};
use crate::llm::{EmbeddingProvider, HashingEmbedder, LlmProvider, OpenAiProvider};
use crate::query_log::QueryLog;
use crate::rag::{build_corpus, Retriever, TextSplitter, VectorIndex};
use crate::server::rate_limit::{build_limiter, IpRateLimiter};
use crate::session::SessionManager;

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes and background tasks.
///
/// Everything here is built once before the listener binds; the vector index
/// and knowledge are read-only afterwards and sessions are the only mutable
/// part.
pub struct AppState {
    pub settings: Settings,
    pub pipeline: ChatPipeline,
    pub history: Option<HistoryStore>,
    pub limiter: Arc<IpRateLimiter>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Loading the knowledge CSVs and the statistics table
    /// 2. Chunking the corpus and embedding every chunk into the vector index
    /// 3. Wiring the model client, session manager and chat pipeline
    /// 4. Opening the history store and query log when enabled
    ///
    /// Knowledge and index failures are fatal.
    pub async fn initialize(
        settings: Settings,
        paths: &AppPaths,
    ) -> Result<Arc<Self>, InitializationError> {
        let knowledge = &settings.knowledge;
        let records = load_knowledge(&knowledge.data_dir)?;
        let statistics = Arc::new(StatisticsTable::load(&knowledge.statistics_file));

        if settings.llm.api_key.is_none() {
            tracing::warn!("No LLM API key configured; provider calls may be rejected");
        }
        let openai = OpenAiProvider::new(
            settings.llm.base_url.clone(),
            settings.llm.api_key.clone(),
            settings.llm.model.clone(),
            settings.embedding.model.clone(),
        );
        let llm: Arc<dyn LlmProvider> = Arc::new(openai.clone());
        let embedder: Arc<dyn EmbeddingProvider> = match settings.embedding.provider {
            EmbeddingProviderKind::OpenAi => Arc::new(openai),
            EmbeddingProviderKind::Hashing => {
                Arc::new(HashingEmbedder::new(settings.embedding.dimensions))
            }
        };

        let corpus = build_corpus(&records);
        let chunks = TextSplitter::new(knowledge.chunk_size, knowledge.chunk_overlap).split(&corpus);
        tracing::info!(
            records = records.len(),
            chunks = chunks.len(),
            chunk_size = knowledge.chunk_size,
            chunk_overlap = knowledge.chunk_overlap,
            "Corpus split"
        );
        let index = VectorIndex::build(chunks, embedder.as_ref(), settings.retrieval.embed_batch_size)
            .await?;

        let history = if settings.history_enabled {
            Some(
                HistoryStore::new(paths.db_path.clone())
                    .await
                    .map_err(|e| InitializationError::History(e.into()))?,
            )
        } else {
            None
        };

        let sessions = SessionManager::new(settings.session.expiry);
        let rules = ChartRules::new(settings.charts.rules.clone());
        let synthesizer = AnswerSynthesizer::new(
            llm.clone(),
            &settings.persona,
            statistics,
            rules.clone(),
            SynthesizerOptions {
                temperature: settings.llm.temperature,
                max_tokens: settings.llm.max_tokens,
                max_history_turns: settings.session.max_history_turns,
                chart_years: settings.charts.years,
            },
        );

        let mut pipeline = ChatPipeline::new(
            sessions,
            QueryRewriter::new(llm, settings.session.max_history_turns),
            Retriever::new(Arc::new(index), embedder, settings.retrieval.top_k),
            synthesizer,
            rules,
            settings.max_input_length,
        )
        .with_request_sweep(settings.session.sweep == SweepMode::OnRequest);

        if knowledge.exact_match {
            let answers = ExactAnswers::from_records(&records);
            tracing::info!(questions = answers.len(), "Exact-match answers enabled");
            pipeline = pipeline.with_exact_answers(answers);
        }
        if let Some(store) = &history {
            pipeline = pipeline.with_history(store.clone());
        }
        if settings.query_log.enabled {
            tracing::info!("Logging user inputs to {}", settings.query_log.path.display());
            pipeline = pipeline.with_query_log(QueryLog::new(settings.query_log.path.clone()));
        }

        Ok(Self::from_parts(settings, pipeline, history))
    }

    pub fn from_parts(
        settings: Settings,
        pipeline: ChatPipeline,
        history: Option<HistoryStore>,
    ) -> Arc<Self> {
        let limiter = build_limiter(
            settings.server.rate_limit_per_minute,
            settings.server.rate_limit_burst,
        );
        Arc::new(Self {
            settings,
            pipeline,
            history,
            limiter,
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        self.pipeline.sessions()
    }

    pub fn chunk_count(&self) -> usize {
        self.pipeline.retriever().index().len()
    }
}
