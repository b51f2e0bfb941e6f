/// Error type shared by the background core

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to decode `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("alarm error: {0}")]
    Alarm(String),

    #[error("malformed message: {0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, Error>;
