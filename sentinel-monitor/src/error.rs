use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Non-200 response from {url}: {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode status from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Invalid block height {value:?} from {url}")]
    InvalidHeight { url: String, value: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Subscription rejected by node: {0}")]
    SubscriptionRejected(String),

    #[error("Subscription to {url} failed after {attempts} attempts: {last_error}")]
    SubscriptionExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Monitor already started")]
    AlreadyStarted,

    #[error("Monitor task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
