use thiserror::Error;

use crate::ids::{RouteId, TicketId};

#[derive(Debug, Error)]
pub enum NexusError {
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    #[error("Route not found: {0}")]
    RouteNotFound(RouteId),

    #[error("Invalid transfer target: {0}")]
    InvalidTransferTarget(String),

    #[error("Ticket {0} has no pending transfer")]
    TransferNotPending(TicketId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Coarse error classification for the outer request boundary.
///
/// None of these are transient: every failure is terminal for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidTransferTarget,
    TransferNotPending,
    Unauthorized,
    Validation,
    /// Snapshot or configuration could not be read or written.
    Storage,
}

impl NexusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NexusError::TicketNotFound(_) | NexusError::RouteNotFound(_) => ErrorKind::NotFound,
            NexusError::InvalidTransferTarget(_) => ErrorKind::InvalidTransferTarget,
            NexusError::TransferNotPending(_) => ErrorKind::TransferNotPending,
            NexusError::Unauthorized(_) => ErrorKind::Unauthorized,
            NexusError::Validation(_) => ErrorKind::Validation,
            NexusError::Io(_) | NexusError::Json(_) | NexusError::Toml(_) => ErrorKind::Storage,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::InvalidTransferTarget => write!(f, "InvalidTransferTarget"),
            ErrorKind::TransferNotPending => write!(f, "TransferNotPending"),
            ErrorKind::Unauthorized => write!(f, "Unauthorized"),
            ErrorKind::Validation => write!(f, "ValidationError"),
            ErrorKind::Storage => write!(f, "Storage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_share_a_kind() {
        assert_eq!(NexusError::TicketNotFound(TicketId(1)).kind(), ErrorKind::NotFound);
        assert_eq!(NexusError::RouteNotFound(RouteId(1)).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn error_display() {
        let err = NexusError::TransferNotPending(TicketId(9));
        assert_eq!(err.to_string(), "Ticket 9 has no pending transfer");
        assert_eq!(err.kind().to_string(), "TransferNotPending");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NexusError>();
    }
}
