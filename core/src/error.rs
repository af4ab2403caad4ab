use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the import and retrieval pipelines. Failures abort
/// the pipeline; chunks committed before the failure remain in the store.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed input at byte {offset}: {message}")]
    MalformedInput { offset: usize, message: String },

    #[error("unsupported mime type `{mime}'")]
    UnsupportedMimeType { mime: String },

    #[error("no registered indexer can answer the query term `{term}'")]
    UnmatchableTerm { term: String },

    #[error("malformed query: {message}")]
    MalformedQuery { message: String },

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),

    #[error("the pipeline was cancelled")]
    Cancelled,
}

impl Error {
    pub fn malformed_input(offset: usize, message: impl Into<String>) -> Self {
        Error::MalformedInput {
            offset,
            message: message.into(),
        }
    }

    pub fn malformed_query(message: impl Into<String>) -> Self {
        Error::MalformedQuery {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Upstream(e.into())
    }
}

impl From<crate::util::window::WindowError> for Error {
    fn from(e: crate::util::window::WindowError) -> Self {
        Error::Upstream(e.into())
    }
}
