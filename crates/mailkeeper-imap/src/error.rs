//! Error types for the transport boundary.

use std::time::Duration;

use thiserror::Error;

use crate::types::{Capability, ResponseCode};

/// Errors a [`Transport`](crate::Transport) call can fail with.
///
/// The variants split into two families: the command was refused by a
/// live server (`No`, `Bad`, `Unsupported`, `Malformed`), or the
/// connection itself is gone (`Bye`, `ConnectionLost`, `Timeout`).
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Server returned NO.
    #[error("Server returned NO: {text}")]
    No {
        /// Structured response code, when the server sent one.
        code: Option<ResponseCode>,
        /// Human readable text.
        text: String,
    },

    /// Server returned BAD.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// The command needs a capability the server doesn't advertise.
    #[error("Capability not supported: {0}")]
    Unsupported(Capability),

    /// The response could not be parsed (e.g. a broken BODYSTRUCTURE).
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// The connection dropped.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Creates a NO error carrying a response code.
    #[must_use]
    pub fn no(code: ResponseCode, text: impl Into<String>) -> Self {
        Self::No {
            code: Some(code),
            text: text.into(),
        }
    }

    /// Creates a NO error without a response code.
    #[must_use]
    pub fn no_text(text: impl Into<String>) -> Self {
        Self::No {
            code: None,
            text: text.into(),
        }
    }

    /// The connection is unusable after this error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Bye(_) | Self::ConnectionLost(_) | Self::Timeout(_))
    }

    /// The server refused the command but the connection is still usable.
    #[must_use]
    pub const fn is_command_failure(&self) -> bool {
        !self.is_connection_error()
    }

    /// The response code for this error.
    ///
    /// A structured code always wins; free-form text is only consulted
    /// when the server sent none.
    #[must_use]
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Self::No { code: Some(code), .. } => Some(code.clone()),
            Self::No { code: None, text } | Self::Bad(text) => ResponseCode::from_legacy_text(text),
            _ => None,
        }
    }

    /// Returns true if the error carries (or implies) the given code.
    #[must_use]
    pub fn has_code(&self, code: &ResponseCode) -> bool {
        self.response_code().as_ref() == Some(code)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
