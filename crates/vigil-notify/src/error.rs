/// Errors that can occur within the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A channel configuration is missing a required field or holds an
    /// invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint kept answering retryably (e.g. 429) until retries ran
    /// out.
    #[error("Notify: {endpoint}: retries exhausted after {attempts} attempts")]
    RetriesExhausted { endpoint: String, attempts: u32 },

    /// JSON serialization of an event payload failed.
    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
