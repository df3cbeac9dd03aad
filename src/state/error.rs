use thiserror::Error;

use crate::knowledge::DataSourceError;
use crate::rag::IndexBuildError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load knowledge: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("Failed to build vector index: {0}")]
    IndexBuild(#[from] IndexBuildError),

    #[error("Failed to initialize history store: {0}")]
    History(#[source] anyhow::Error),
}
