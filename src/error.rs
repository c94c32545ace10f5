use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    #[error("no session credential available")]
    MissingCredential,

    #[error("live channel is already connected")]
    AlreadyConnected,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("history fetch failed: {0}")]
    Fetch(String),

    #[error("update arrived after the view moved on")]
    StaleUpdate,
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::Fetch(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NotifyError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        NotifyError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
