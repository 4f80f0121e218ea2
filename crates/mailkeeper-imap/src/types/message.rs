//! Fetch, search and store parameters.

use chrono::{DateTime, NaiveDate, Utc};

use super::{Flags, Uid, UidSet};

/// How much of each message a FETCH asks for.
///
/// The variants are ordered from richest to leanest; a failed fetch is
/// retried one level further down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FetchProfile {
    /// Flags, size, internal date, headers and body structure.
    #[default]
    Full,
    /// Like `Full` without the body structure.
    NoStructure,
    /// Header fields only.
    HeadersOnly,
}

impl FetchProfile {
    /// The next leaner profile, if any.
    #[must_use]
    pub const fn degrade(self) -> Option<Self> {
        match self {
            Self::Full => Some(Self::NoStructure),
            Self::NoStructure => Some(Self::HeadersOnly),
            Self::HeadersOnly => None,
        }
    }

    /// Returns the FETCH item list for this profile.
    #[must_use]
    pub const fn items(self) -> &'static str {
        match self {
            Self::Full => "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER] BODYSTRUCTURE)",
            Self::NoStructure => "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER])",
            Self::HeadersOnly => "(UID BODY.PEEK[HEADER])",
        }
    }
}

/// A message as returned by UID FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Message UID.
    pub uid: Uid,
    /// Flags, empty for `HeadersOnly`.
    pub flags: Flags,
    /// RFC822.SIZE, 0 when not fetched.
    pub size: u32,
    /// INTERNALDATE, when fetched.
    pub internal_date: Option<DateTime<Utc>>,
    /// Header fields in message order.
    pub headers: Vec<(String, String)>,
    /// Raw BODYSTRUCTURE text, only for `Full`.
    pub body_structure: Option<String>,
}

impl FetchedMessage {
    /// Returns the first value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with \Answered flag.
    Answered,
    /// Messages with \Deleted flag.
    Deleted,
    /// Messages with \Draft flag.
    Draft,
    /// Messages with \Flagged flag.
    Flagged,
    /// Messages without \Deleted flag.
    Undeleted,
    /// Messages without \Seen flag.
    Unseen,
    /// Messages with \Seen flag.
    Seen,
    /// Messages carrying a keyword.
    Keyword(String),
    /// UID set.
    Uids(UidSet),
    /// Subject contains text.
    Subject(String),
    /// From contains text.
    From(String),
    /// To contains text.
    To(String),
    /// Cc contains text.
    Cc(String),
    /// Body contains text.
    Body(String),
    /// Text in header or body.
    Text(String),
    /// Header field contains value.
    Header(String, String),
    /// Internal date on or after.
    Since(NaiveDate),
    /// Internal date before.
    Before(NaiveDate),
    /// Larger than size.
    Larger(u32),
    /// Smaller than size.
    Smaller(u32),
    /// AND of criteria.
    And(Vec<Self>),
    /// OR of criteria.
    Or(Box<Self>, Box<Self>),
    /// NOT of criteria.
    Not(Box<Self>),
}

impl SearchCriteria {
    /// Returns true if evaluating the criteria needs message bodies.
    #[must_use]
    pub fn needs_body(&self) -> bool {
        match self {
            Self::Body(_) | Self::Text(_) => true,
            Self::And(items) => items.iter().any(Self::needs_body),
            Self::Or(a, b) => a.needs_body() || b.needs_body(),
            Self::Not(inner) => inner.needs_body(),
            _ => false,
        }
    }
}

/// A SORT key (RFC 5256, RFC 5957).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    /// Internal date.
    Arrival,
    /// Date header.
    Date,
    /// First From address.
    From,
    /// First To address.
    To,
    /// First Cc address.
    Cc,
    /// Base subject.
    Subject,
    /// RFC822.SIZE.
    Size,
    /// Display name of the first From address (SORT=DISPLAY).
    DisplayFrom,
    /// Display name of the first To address (SORT=DISPLAY).
    DisplayTo,
    /// `\Flagged` state; no server-side SORT key exists for it.
    Flagged,
    /// `\Seen` state; no server-side SORT key exists for it.
    Seen,
}

impl SortKey {
    /// The SORT atom for this key, `None` when the server cannot sort by it.
    #[must_use]
    pub const fn atom(self) -> Option<&'static str> {
        match self {
            Self::Arrival => Some("ARRIVAL"),
            Self::Date => Some("DATE"),
            Self::From => Some("FROM"),
            Self::To => Some("TO"),
            Self::Cc => Some("CC"),
            Self::Subject => Some("SUBJECT"),
            Self::Size => Some("SIZE"),
            Self::DisplayFrom => Some("DISPLAYFROM"),
            Self::DisplayTo => Some("DISPLAYTO"),
            Self::Flagged | Self::Seen => None,
        }
    }

    /// Returns true for keys that need SORT=DISPLAY.
    #[must_use]
    pub const fn is_display(self) -> bool {
        matches!(self, Self::DisplayFrom | Self::DisplayTo)
    }
}

/// One SORT criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortCriterion {
    /// The key.
    pub key: SortKey,
    /// Descending order.
    pub reverse: bool,
}

impl SortCriterion {
    /// Ascending criterion.
    #[must_use]
    pub const fn ascending(key: SortKey) -> Self {
        Self { key, reverse: false }
    }

    /// Descending criterion.
    #[must_use]
    pub const fn descending(key: SortKey) -> Self {
        Self { key, reverse: true }
    }
}

/// Which SORT command form to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortVariant {
    /// Plain `UID SORT`.
    #[default]
    Plain,
    /// `UID SORT RETURN (ALL)` (ESORT).
    Extended,
}

/// How a STORE changes flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    /// `+FLAGS.SILENT`
    Add,
    /// `-FLAGS.SILENT`
    Remove,
    /// `FLAGS.SILENT`
    Replace,
}
