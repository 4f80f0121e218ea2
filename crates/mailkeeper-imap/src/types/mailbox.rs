//! Mailbox types.

use super::{Flags, Uid, UidValidity};

/// Special-use role of a mailbox (RFC 6154).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialUse {
    /// All messages (virtual mailbox).
    All,
    /// Archive folder.
    Archive,
    /// Drafts folder.
    Drafts,
    /// Flagged messages (virtual mailbox).
    Flagged,
    /// Junk/spam folder.
    Junk,
    /// Sent folder.
    Sent,
    /// Trash folder.
    Trash,
    /// Important messages (RFC 8457).
    Important,
}

impl SpecialUse {
    /// Returns the attribute as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "\\All",
            Self::Archive => "\\Archive",
            Self::Drafts => "\\Drafts",
            Self::Flagged => "\\Flagged",
            Self::Junk => "\\Junk",
            Self::Sent => "\\Sent",
            Self::Trash => "\\Trash",
            Self::Important => "\\Important",
        }
    }
}

impl std::fmt::Display for SpecialUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mailbox status information from SELECT/EXAMINE.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Flags that can be permanently stored.
    pub permanent_flags: Flags,
    /// Whether mailbox is read-only.
    pub read_only: bool,
}

/// LIST/LSUB response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Full mailbox name.
    pub name: String,
}

impl ListEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, delimiter: Option<char>, attributes: Vec<MailboxAttribute>) -> Self {
        Self {
            attributes,
            delimiter,
            name: name.into(),
        }
    }

    /// Returns true if the attribute is present.
    #[must_use]
    pub fn has(&self, attribute: &MailboxAttribute) -> bool {
        self.attributes.contains(attribute)
    }

    /// The mailbox can be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.has(&MailboxAttribute::NoSelect) && !self.has(&MailboxAttribute::NonExistent)
    }

    /// The mailbox may hold child mailboxes.
    #[must_use]
    pub fn has_inferiors(&self) -> bool {
        !self.has(&MailboxAttribute::NoInferiors)
    }

    /// The server reported the name only as a hierarchy placeholder.
    #[must_use]
    pub fn is_nonexistent(&self) -> bool {
        self.has(&MailboxAttribute::NonExistent)
    }

    /// First special-use role announced for the mailbox.
    #[must_use]
    pub fn special_use(&self) -> Option<SpecialUse> {
        self.attributes.iter().find_map(MailboxAttribute::special_use)
    }
}

/// Mailbox attributes from LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox cannot have children.
    NoInferiors,
    /// Name exists only as part of the hierarchy (RFC 5258).
    NonExistent,
    /// Mailbox has no children.
    HasNoChildren,
    /// Mailbox has children.
    HasChildren,
    /// Mailbox is marked for attention.
    Marked,
    /// Mailbox is not marked.
    Unmarked,
    /// Mailbox is subscribed.
    Subscribed,
    /// Mailbox lives on a remote server (RFC 5258).
    Remote,
    /// Special-use attribute (RFC 6154).
    Use(SpecialUse),
    /// Unknown attribute.
    Unknown(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NOINFERIORS" => Self::NoInferiors,
            "\\NONEXISTENT" => Self::NonExistent,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\SUBSCRIBED" => Self::Subscribed,
            "\\REMOTE" => Self::Remote,
            "\\ALL" => Self::Use(SpecialUse::All),
            "\\ARCHIVE" => Self::Use(SpecialUse::Archive),
            "\\DRAFTS" => Self::Use(SpecialUse::Drafts),
            "\\FLAGGED" => Self::Use(SpecialUse::Flagged),
            "\\JUNK" | "\\SPAM" => Self::Use(SpecialUse::Junk),
            "\\SENT" => Self::Use(SpecialUse::Sent),
            "\\TRASH" => Self::Use(SpecialUse::Trash),
            "\\IMPORTANT" => Self::Use(SpecialUse::Important),
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns the special-use role carried by this attribute.
    #[must_use]
    pub const fn special_use(&self) -> Option<SpecialUse> {
        match self {
            Self::Use(u) => Some(*u),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod list_entry_tests {
        use super::*;

        #[test]
        fn selectable_by_default() {
            let entry = ListEntry::new("Sent", Some('/'), vec![MailboxAttribute::HasNoChildren]);
            assert!(entry.is_selectable());
            assert!(entry.has_inferiors());
            assert!(!entry.is_nonexistent());
        }

        #[test]
        fn noselect_container() {
            let entry = ListEntry::new("Shared", Some('/'), vec![MailboxAttribute::NoSelect]);
            assert!(!entry.is_selectable());
            assert!(entry.has_inferiors());
        }

        #[test]
        fn noinferiors_leaf() {
            let entry = ListEntry::new("Trash", Some('.'), vec![MailboxAttribute::NoInferiors]);
            assert!(!entry.has_inferiors());
        }

        #[test]
        fn special_use() {
            let entry = ListEntry::new(
                "Deleted Items",
                Some('/'),
                vec![
                    MailboxAttribute::HasNoChildren,
                    MailboxAttribute::Use(SpecialUse::Trash),
                ],
            );
            assert_eq!(entry.special_use(), Some(SpecialUse::Trash));
        }
    }

    mod mailbox_attribute_tests {
        use super::*;

        #[test]
        fn parse_noselect() {
            assert_eq!(MailboxAttribute::parse("\\NoSelect"), MailboxAttribute::NoSelect);
            assert_eq!(MailboxAttribute::parse("\\NOSELECT"), MailboxAttribute::NoSelect);
        }

        #[test]
        fn parse_nonexistent() {
            assert_eq!(
                MailboxAttribute::parse("\\NonExistent"),
                MailboxAttribute::NonExistent
            );
        }

        #[test]
        fn parse_special_use() {
            assert_eq!(
                MailboxAttribute::parse("\\Trash"),
                MailboxAttribute::Use(SpecialUse::Trash)
            );
            assert_eq!(
                MailboxAttribute::parse("\\Spam"),
                MailboxAttribute::Use(SpecialUse::Junk)
            );
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(
                MailboxAttribute::parse("\\Custom"),
                MailboxAttribute::Unknown("\\Custom".to_string())
            );
        }
    }
}
