//! Error types for the core library.

use std::time::Duration;

use mailkeeper_imap::ResponseCode;
use thiserror::Error;

/// Errors that can occur in mailbox operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A folder name failed validation.
    #[error("Invalid folder name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A request failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The user lacks the rights for the operation.
    #[error("Permission denied on {folder}: {detail}")]
    Permission {
        /// Folder the check failed on.
        folder: String,
        /// What was missing.
        detail: String,
    },

    /// An ACL change would leave no entry with administer rights.
    #[error("No administrator ACL would remain on {0}")]
    NoAdminAcl(String),

    /// Default folders can't be renamed, moved or deleted.
    #[error("{0} is a default folder")]
    DefaultFolder(String),

    /// Folder or message doesn't exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A folder with that name already exists.
    #[error("Duplicate folder: {0}")]
    Duplicate(String),

    /// The server lacks a capability the request can't do without.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The operation would exceed the quota.
    #[error("Quota exceeded on {folder}")]
    QuotaExceeded {
        /// Folder the quota was hit on.
        folder: String,
    },

    /// The connection broke.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Another operation holds the mailbox.
    #[error("Mailbox in use: {0}")]
    ConcurrentUse(String),

    /// A recent failure on the mailbox is still cooling down.
    #[error("{folder} failed recently, retry in {remaining:?}")]
    FailFast {
        /// Folder marked as failed.
        folder: String,
        /// Time left in the cooldown window.
        remaining: Duration,
    },

    /// The server answered in a way the engine didn't expect.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unmapped transport failure.
    #[error("IMAP error: {0}")]
    Transport(#[from] mailkeeper_imap::Error),
}

/// Matchable error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input: names, requests, ACL sets.
    Validation,
    /// Missing rights.
    Permission,
    /// Folder or message not found.
    NotFound,
    /// Name already taken.
    Duplicate,
    /// Capability missing.
    CapabilityUnsupported,
    /// Quota hit.
    QuotaExceeded,
    /// Connection broken or short-circuited.
    Connection,
    /// Mailbox held by another operation.
    ConcurrentUse,
    /// Anything else the server said.
    Protocol,
}

impl Error {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName { .. }
            | Self::Validation(_)
            | Self::NoAdminAcl(_)
            | Self::DefaultFolder(_)
            | Self::Config(_) => ErrorKind::Validation,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::Unsupported(_) => ErrorKind::CapabilityUnsupported,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::Connection(_) | Self::FailFast { .. } => ErrorKind::Connection,
            Self::ConcurrentUse(_) => ErrorKind::ConcurrentUse,
            Self::Protocol(_) | Self::Transport(_) => ErrorKind::Protocol,
        }
    }

    /// Returns true if the mailbox should be marked fail-fast.
    ///
    /// [`Error::ConcurrentUse`] counts because transport INUSE answers map
    /// to it.
    #[must_use]
    pub fn marks_fail_fast(&self) -> bool {
        match self {
            Self::Connection(_) | Self::ConcurrentUse(_) => true,
            Self::Transport(err) => {
                err.is_connection_error() || err.has_code(&ResponseCode::InUse)
            }
            _ => false,
        }
    }

    /// Maps a transport error raised while working on `folder`.
    ///
    /// The response code decides the kind. Errors without a recognized
    /// code stay [`Error::Transport`] so callers can still inspect them.
    pub fn from_transport(err: mailkeeper_imap::Error, folder: &str) -> Self {
        use mailkeeper_imap::Error as Imap;

        if err.is_connection_error() {
            return Self::Connection(err.to_string());
        }
        if let Imap::Unsupported(capability) = &err {
            return Self::Unsupported(capability.to_string());
        }
        match err.response_code() {
            Some(ResponseCode::NoPerm) => Self::Permission {
                folder: folder.to_string(),
                detail: err.to_string(),
            },
            Some(ResponseCode::OverQuota) => Self::QuotaExceeded {
                folder: folder.to_string(),
            },
            Some(ResponseCode::AlreadyExists) => Self::Duplicate(folder.to_string()),
            Some(ResponseCode::NonExistent | ResponseCode::TryCreate) => {
                Self::NotFound(folder.to_string())
            }
            Some(ResponseCode::InUse) => Self::ConcurrentUse(folder.to_string()),
            _ => Self::Transport(err),
        }
    }
}

/// Extension for attaching a folder to transport results.
pub(crate) trait TransportResultExt<T> {
    /// Maps the error with [`Error::from_transport`].
    fn on_folder(self, folder: &str) -> Result<T>;
}

impl<T> TransportResultExt<T> for mailkeeper_imap::Result<T> {
    fn on_folder(self, folder: &str) -> Result<T> {
        self.map_err(|e| Error::from_transport(e, folder))
    }
}

/// Non-fatal outcome recorded on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// SUBSCRIBE or UNSUBSCRIBE failed.
    SubscriptionFailed {
        /// Folder concerned.
        folder: String,
        /// Server text.
        detail: String,
    },
    /// One ACL entry could not be applied.
    AclEntryFailed {
        /// Folder concerned.
        folder: String,
        /// Identifier of the entry.
        identifier: String,
        /// Server text.
        detail: String,
    },
    /// Initial ACLs were skipped because the creator can't administer the folder.
    NoAdministerAccessOnInitial {
        /// Folder concerned.
        folder: String,
    },
    /// Default folders stay subscribed.
    DefaultFolderUnsubscribe {
        /// Folder concerned.
        folder: String,
    },
    /// Best-effort cleanup failed.
    CleanupFailed {
        /// Folder concerned.
        folder: String,
        /// Server text.
        detail: String,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailkeeper_imap::{Capability, Error as Imap};

    mod mapping_tests {
        use super::*;

        #[test]
        fn structured_codes() {
            let cases = [
                (ResponseCode::NoPerm, ErrorKind::Permission),
                (ResponseCode::OverQuota, ErrorKind::QuotaExceeded),
                (ResponseCode::AlreadyExists, ErrorKind::Duplicate),
                (ResponseCode::NonExistent, ErrorKind::NotFound),
                (ResponseCode::TryCreate, ErrorKind::NotFound),
                (ResponseCode::InUse, ErrorKind::ConcurrentUse),
                (ResponseCode::ServerBug, ErrorKind::Protocol),
            ];
            for (code, kind) in cases {
                let err = Error::from_transport(Imap::no(code, "x"), "F");
                assert_eq!(err.kind(), kind);
            }
        }

        #[test]
        fn legacy_text_bridge() {
            let err = Error::from_transport(Imap::no_text("Over quota"), "Sent");
            assert!(matches!(err, Error::QuotaExceeded { ref folder } if folder == "Sent"));
        }

        #[test]
        fn connection_errors() {
            let err = Error::from_transport(Imap::Bye("shutting down".into()), "INBOX");
            assert_eq!(err.kind(), ErrorKind::Connection);
            assert!(err.marks_fail_fast());
        }

        #[test]
        fn unsupported_capability() {
            let err = Error::from_transport(Imap::Unsupported(Capability::Sort), "INBOX");
            assert_eq!(err.kind(), ErrorKind::CapabilityUnsupported);
        }

        #[test]
        fn in_use_marks_fail_fast() {
            let err = Error::Transport(Imap::no(ResponseCode::InUse, "busy"));
            assert!(err.marks_fail_fast());
            assert!(Error::from_transport(Imap::no(ResponseCode::InUse, "busy"), "F").marks_fail_fast());
            assert!(!Error::NotFound("x".into()).marks_fail_fast());
        }
    }
}
