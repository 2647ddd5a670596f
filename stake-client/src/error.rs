use std::time::Duration;

use stake_core::error::{ConflictKind, StakeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered and refused the request
    #[error("rejected ({status}): {message}")]
    Rejected {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    /// No answer from the server
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server did not answer in time
    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl ClientError {
    pub fn reason(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        self.reason().and_then(ConflictKind::from_code)
    }

    /// True when the call may succeed if repeated: the server was unreachable,
    /// too slow, or failed on its side without judging the request.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Timeout(_) => true,
            ClientError::Rejected { status, reason, .. } => {
                *status >= 500 || reason.as_deref() == Some("STORE_ERROR")
            }
            ClientError::InvalidTransition(_) => false,
        }
    }

    /// True when a failed commit means the lease itself is gone.
    pub fn loses_lease(&self) -> bool {
        matches!(
            self.conflict_kind(),
            Some(ConflictKind::ReservationMissing | ConflictKind::AlreadyAssigned)
        )
    }
}

impl From<StakeError> for ClientError {
    fn from(err: StakeError) -> Self {
        let status = match &err {
            StakeError::NotFound(_) => 404,
            StakeError::Invalid(_) => 400,
            StakeError::Store(_) => 500,
            StakeError::Unavailable(_) | StakeError::Conflict { .. } => 409,
        };
        ClientError::Rejected {
            status,
            reason: Some(err.code().to_string()),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
