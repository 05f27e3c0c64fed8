//! Unified error handling for command processing.
//!
//! Store errors are mapped to chat replies here. Only caller mistakes and
//! empty results get specific text; everything else gets a generic reply so
//! internal detail never reaches the chat.

use crate::db::DbError;
use crate::transport::TransportError;
use thiserror::Error;

/// Generic reply for failures the user can't act on.
pub const TRY_AGAIN_LATER: &str = "Sorry, something went wrong. Please try again later.";

/// Errors that can occur during command handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandlerError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Db(e) => e.error_code(),
            Self::Transport(_) => "transport",
        }
    }

    /// Convert to the text sent back to the channel.
    ///
    /// Returns `None` when no reply should be attempted (the transport itself failed).
    pub fn to_reply(&self) -> Option<&'static str> {
        match self {
            Self::Db(DbError::Validation(_)) => Some("Please provide a message after !new"),
            Self::Db(DbError::Duplicate(_)) => Some("That message is already saved."),
            Self::Db(DbError::NotFound(_)) => Some("There are no saved messages yet."),
            Self::Db(_) => Some(TRY_AGAIN_LATER),
            Self::Transport(_) => None,
        }
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_visible_errors_get_specific_text() {
        let err = HandlerError::from(DbError::Validation("empty".into()));
        assert_eq!(err.to_reply(), Some("Please provide a message after !new"));

        let err = HandlerError::from(DbError::NotFound("none".into()));
        assert_eq!(err.to_reply(), Some("There are no saved messages yet."));

        let err = HandlerError::from(DbError::Duplicate("x".into()));
        assert_eq!(err.to_reply(), Some("That message is already saved."));
    }

    #[test]
    fn internal_errors_are_generic() {
        for err in [
            DbError::Transient("database is locked".into()),
            DbError::Connection("refused".into()),
            DbError::Schema("no such column".into()),
        ] {
            let reply = HandlerError::from(err).to_reply().unwrap();
            assert_eq!(reply, TRY_AGAIN_LATER);
        }
    }

    #[test]
    fn transport_errors_get_no_reply() {
        let err = HandlerError::from(TransportError::Closed);
        assert_eq!(err.to_reply(), None);
        assert_eq!(err.error_code(), "transport");
    }
}
