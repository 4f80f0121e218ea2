//! Response codes.

use super::{Flag, Uid, UidValidity};

/// Data of an APPENDUID response code (RFC 4315).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendUid {
    /// UIDVALIDITY of the destination mailbox.
    pub uid_validity: UidValidity,
    /// UIDs assigned to the appended messages, in append order.
    pub uids: Vec<Uid>,
}

/// Data of a COPYUID response code (RFC 4315).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUid {
    /// UIDVALIDITY of the destination mailbox.
    pub uid_validity: UidValidity,
    /// Source UIDs.
    pub source: Vec<Uid>,
    /// Destination UIDs, positionally matching `source`.
    pub dest: Vec<Uid>,
}

impl CopyUid {
    /// Destination UID for a source UID, if the server reported one.
    #[must_use]
    pub fn dest_for(&self, source: Uid) -> Option<Uid> {
        self.source
            .iter()
            .position(|u| *u == source)
            .and_then(|i| self.dest.get(i).copied())
    }
}

/// Response code from a tagged response.
///
/// These provide additional information about command completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// PERMANENTFLAGS: Flags that can be changed permanently.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// TRYCREATE: Mailbox doesn't exist, but can be created.
    TryCreate,
    /// NOPERM: Access control prevented the operation (RFC 5530).
    NoPerm,
    /// OVERQUOTA: The operation would exceed a quota (RFC 5530).
    OverQuota,
    /// LIMIT: A server-side limit was reached (RFC 5530).
    Limit,
    /// ALREADYEXISTS: The target name is taken (RFC 5530).
    AlreadyExists,
    /// NONEXISTENT: The mailbox or message doesn't exist (RFC 5530).
    NonExistent,
    /// INUSE: The mailbox is in use by another session (RFC 5530).
    InUse,
    /// CANNOT: The operation violates a server invariant (RFC 5530).
    Cannot,
    /// UNAVAILABLE: Temporary server failure (RFC 5530).
    Unavailable,
    /// SERVERBUG: The server hit an internal error (RFC 5530).
    ServerBug,
    /// APPENDUID: UIDs assigned to appended messages.
    AppendUid(AppendUid),
    /// COPYUID: UIDs of copied messages.
    CopyUid(CopyUid),
    /// Unknown response code.
    Unknown(String),
}

impl ResponseCode {
    /// Parses a bracketed code atom without arguments, e.g. `NOPERM`.
    #[must_use]
    pub fn parse_atom(atom: &str) -> Self {
        match atom.to_uppercase().as_str() {
            "ALERT" => Self::Alert,
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "TRYCREATE" => Self::TryCreate,
            "NOPERM" => Self::NoPerm,
            "OVERQUOTA" => Self::OverQuota,
            "LIMIT" => Self::Limit,
            "ALREADYEXISTS" => Self::AlreadyExists,
            "NONEXISTENT" => Self::NonExistent,
            "INUSE" => Self::InUse,
            "CANNOT" => Self::Cannot,
            "UNAVAILABLE" => Self::Unavailable,
            "SERVERBUG" => Self::ServerBug,
            _ => Self::Unknown(atom.to_string()),
        }
    }

    /// Recovers a code from free-form response text.
    ///
    /// Only meant for servers that put the condition into the human
    /// readable text instead of a bracketed code. Structured codes always
    /// take precedence over this.
    #[must_use]
    pub fn from_legacy_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if let Some(start) = text.find('[') {
            if let Some(len) = text[start + 1..].find(']') {
                let atom = &text[start + 1..start + 1 + len];
                let atom = atom.split_whitespace().next().unwrap_or_default();
                let code = Self::parse_atom(atom);
                if !matches!(code, Self::Unknown(_)) {
                    return Some(code);
                }
            }
        }
        if lower.contains("quota") {
            Some(Self::OverQuota)
        } else if lower.contains("already exists") {
            Some(Self::AlreadyExists)
        } else if lower.contains("in use") {
            Some(Self::InUse)
        } else if lower.contains("permission denied") || lower.contains("not allowed") {
            Some(Self::NoPerm)
        } else if lower.contains("too many") {
            Some(Self::Limit)
        } else if lower.contains("doesn't exist") || lower.contains("does not exist") {
            Some(Self::NonExistent)
        } else {
            None
        }
    }
}
