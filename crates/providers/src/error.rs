use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("auth error: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Connection and timeout failures are the only ones the planner
    /// retries once; API status errors and malformed bodies surface
    /// immediately — retrying a 4xx or a parse failure just repeats it.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ProviderError::Connection(_) | ProviderError::Timeout(_))
    }
}

pub fn from_reqwest(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(0)
    } else {
        ProviderError::Connection(e.to_string())
    }
}
