use std::time::Duration;

use thiserror::Error;

/// Errors produced while talking to the LocalAI backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, broken body read
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// A non-streaming response body was not the JSON we expected
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No bytes arrived on a streaming response within the idle window
    #[error("no data received for {}s", .0.as_secs())]
    Timeout(Duration),

    /// The user stopped the generation
    #[error("generation cancelled")]
    Cancelled,
}

impl ApiError {
    /// Short message suitable for the status bar
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(e) if e.is_connect() => {
                "Cannot reach the backend. Is it running?".to_string()
            }
            ApiError::Transport(_) => "Connection to the backend failed.".to_string(),
            ApiError::Status { status, .. } => {
                format!("Backend error ({})", status.as_u16())
            }
            ApiError::Decode(_) => "The backend sent an unexpected response.".to_string(),
            ApiError::Timeout(d) => format!("The backend stopped responding ({}s).", d.as_secs()),
            ApiError::Cancelled => "Generation stopped.".to_string(),
        }
    }
}
