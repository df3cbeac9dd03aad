//! Static knowledge loaded once at startup: the FAQ records that feed the
//! vector index and the yearly statistics behind charts.

pub mod loader;
pub mod statistics;

pub use loader::{load_knowledge, DataSourceError, KnowledgeRecord};
pub use statistics::{DataPoint, StatisticsTable};

/// Decodes file bytes as UTF-8 (BOM stripped), falling back to Latin-1.
///
/// Returns the text and whether the fallback was used.
pub(crate) fn decode_text(bytes: &[u8]) -> (String, bool) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), false),
        // Every byte is a valid Latin-1 code point.
        Err(_) => (bytes.iter().map(|&b| char::from(b)).collect(), true),
    }
}
