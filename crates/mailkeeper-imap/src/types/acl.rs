//! Access control types (RFC 4314).

use bitflags::bitflags;

bitflags! {
    /// Rights held by an identifier on a mailbox.
    ///
    /// The letters follow RFC 4314. The obsolete `c` and `d` rights of
    /// RFC 2086 are accepted on input and expanded.
    pub struct Rights: u16 {
        /// `l`: mailbox is visible to LIST/LSUB.
        const LOOKUP = 1 << 0;
        /// `r`: SELECT, FETCH, SEARCH, COPY from the mailbox.
        const READ = 1 << 1;
        /// `s`: keep seen/unseen state across sessions.
        const KEEP_SEEN = 1 << 2;
        /// `w`: set flags other than `\Seen` and `\Deleted`.
        const WRITE = 1 << 3;
        /// `i`: APPEND and COPY into the mailbox.
        const INSERT = 1 << 4;
        /// `p`: send mail to the submission address of the mailbox.
        const POST = 1 << 5;
        /// `k`: create child mailboxes.
        const CREATE_MAILBOX = 1 << 6;
        /// `x`: delete or rename the mailbox.
        const DELETE_MAILBOX = 1 << 7;
        /// `t`: set or clear `\Deleted`.
        const DELETE_MESSAGES = 1 << 8;
        /// `e`: EXPUNGE.
        const EXPUNGE = 1 << 9;
        /// `a`: administer, i.e. SETACL/DELETEACL/GETACL/LISTRIGHTS.
        const ADMINISTER = 1 << 10;
    }
}

const LETTERS: [(char, Rights); 11] = [
    ('l', Rights::LOOKUP),
    ('r', Rights::READ),
    ('s', Rights::KEEP_SEEN),
    ('w', Rights::WRITE),
    ('i', Rights::INSERT),
    ('p', Rights::POST),
    ('k', Rights::CREATE_MAILBOX),
    ('x', Rights::DELETE_MAILBOX),
    ('t', Rights::DELETE_MESSAGES),
    ('e', Rights::EXPUNGE),
    ('a', Rights::ADMINISTER),
];

impl Rights {
    /// Parses a rights string such as `lrswipkxtea`.
    ///
    /// Unknown letters (including the digits reserved for server-defined
    /// rights) are ignored.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let mut rights = Self::empty();
        for c in s.chars() {
            match c {
                'c' => rights |= Self::CREATE_MAILBOX,
                'd' => rights |= Self::DELETE_MESSAGES | Self::EXPUNGE | Self::DELETE_MAILBOX,
                _ => {
                    if let Some((_, r)) = LETTERS.iter().find(|(l, _)| *l == c) {
                        rights |= *r;
                    }
                }
            }
        }
        rights
    }

    /// Returns these rights with `POST` cleared, the form used when
    /// comparing entries.
    #[must_use]
    pub fn without_post(self) -> Self {
        self - Self::POST
    }

    /// The identifier may administer the mailbox.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        self.contains(Self::ADMINISTER)
    }

    /// The identifier may delete messages (set `\Deleted`).
    #[must_use]
    pub const fn can_delete_messages(self) -> bool {
        self.contains(Self::DELETE_MESSAGES)
    }
}

impl Default for Rights {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Display for Rights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (letter, right) in LETTERS {
            if self.contains(right) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// One ACL entry: an identifier and its rights.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AclEntry {
    /// The identifier (user or group name) as the server knows it.
    pub identifier: String,
    /// Rights granted to the identifier.
    pub rights: Rights,
}

impl AclEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(identifier: impl Into<String>, rights: Rights) -> Self {
        Self {
            identifier: identifier.into(),
            rights,
        }
    }

    /// Creates an entry from a rights string.
    #[must_use]
    pub fn parse(identifier: impl Into<String>, rights: &str) -> Self {
        Self::new(identifier, Rights::parse(rights))
    }
}

impl std::fmt::Display for AclEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.identifier, self.rights)
    }
}
