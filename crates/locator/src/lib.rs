pub mod client;
pub mod config;
pub mod database;
pub mod diff;
pub mod ingest;
pub mod mapper;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod normalize;
pub mod parser;
pub mod radius;
pub mod search;

use database::DatabaseError;
use ingest::IngestError;
use normalize::NormalizationError;
use parser::UnsupportedFormatError;
use search::{SearchError, ValidationError};

/// Everything a search or ingestion request can fail with.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error("bulk write failed ({corrupted_count} corrupted records in batch): {source}")]
    Write {
        corrupted_count: u64,
        #[source]
        source: DatabaseError,
    },
    #[error(transparent)]
    Store(#[from] DatabaseError),
    #[error("can not fetch source: {0}")]
    Fetch(#[from] reqwest::Error),
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RequestError::Store(DatabaseError::Timeout(_))
                | RequestError::Write {
                    source: DatabaseError::Timeout(_),
                    ..
                }
        ) || matches!(self, RequestError::Fetch(why) if why.is_timeout())
    }
}

impl From<SearchError> for RequestError {
    fn from(value: SearchError) -> Self {
        match value {
            SearchError::Validation(why) => why.into(),
            SearchError::Store(why) => why.into(),
        }
    }
}

impl From<IngestError> for RequestError {
    fn from(value: IngestError) -> Self {
        match value {
            IngestError::UnsupportedFormat(why) => why.into(),
            IngestError::Normalization(why) => why.into(),
            IngestError::Write {
                corrupted_count,
                source,
            } => RequestError::Write {
                corrupted_count,
                source,
            },
            IngestError::Store(why) => why.into(),
        }
    }
}

pub type RequestResult<T> = Result<T, RequestError>;
