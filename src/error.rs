use thiserror::Error;

/// Failures of the external classification call.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier API key not configured (set {env_var})")]
    MissingApiKey { env_var: String },

    #[error("classifier request timed out")]
    Timeout,

    #[error("classifier transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("classifier returned status {status}")]
    Status { status: u16 },

    #[error("classifier response could not be decoded: {0}")]
    Decode(String),

    #[error("classifier returned no text")]
    EmptyOutput,
}

impl ClassifierError {
    /// Stable label for logs and counters; never includes model output.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifierError::MissingApiKey { .. } => "missing_api_key",
            ClassifierError::Timeout => "timeout",
            ClassifierError::Transport(_) => "transport",
            ClassifierError::Status { .. } => "status",
            ClassifierError::Decode(_) => "decode",
            ClassifierError::EmptyOutput => "empty_output",
        }
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClassifierError::Timeout
        } else if err.is_decode() {
            ClassifierError::Decode(err.to_string())
        } else {
            ClassifierError::Transport(err)
        }
    }
}
