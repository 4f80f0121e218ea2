//! Server capabilities.

use std::collections::HashSet;

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// NAMESPACE command support (RFC 2342)
    Namespace,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// MOVE extension (RFC 6851)
    Move,
    /// ACL extension (RFC 4314)
    Acl,
    /// Additional rights advertised by the ACL extension, e.g. `RIGHTS=texk`
    Rights(String),
    /// QUOTA extension (RFC 9208)
    Quota,
    /// SORT extension (RFC 5256)
    Sort,
    /// SORT=DISPLAY extension (RFC 5957)
    SortDisplay,
    /// ESORT extension (RFC 5267)
    ESort,
    /// CHILDREN extension (RFC 3348)
    Children,
    /// LIST-EXTENDED (RFC 5258)
    ListExtended,
    /// SPECIAL-USE mailboxes (RFC 6154)
    SpecialUse,
    /// CREATE-SPECIAL-USE (RFC 6154)
    CreateSpecialUse,
    /// METADATA extension (RFC 5464)
    Metadata,
    /// IDLE command support (RFC 2177)
    Idle,
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "NAMESPACE" => Self::Namespace,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "ACL" => Self::Acl,
            "QUOTA" => Self::Quota,
            "SORT" => Self::Sort,
            "SORT=DISPLAY" => Self::SortDisplay,
            "ESORT" => Self::ESort,
            "CHILDREN" => Self::Children,
            "LIST-EXTENDED" => Self::ListExtended,
            "SPECIAL-USE" => Self::SpecialUse,
            "CREATE-SPECIAL-USE" => Self::CreateSpecialUse,
            "METADATA" | "METADATA-SERVER" => Self::Metadata,
            "IDLE" => Self::Idle,
            _ if upper.starts_with("RIGHTS=") => Self::Rights(s[7..].to_string()),
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Move => write!(f, "MOVE"),
            Self::Acl => write!(f, "ACL"),
            Self::Rights(r) => write!(f, "RIGHTS={r}"),
            Self::Quota => write!(f, "QUOTA"),
            Self::Sort => write!(f, "SORT"),
            Self::SortDisplay => write!(f, "SORT=DISPLAY"),
            Self::ESort => write!(f, "ESORT"),
            Self::Children => write!(f, "CHILDREN"),
            Self::ListExtended => write!(f, "LIST-EXTENDED"),
            Self::SpecialUse => write!(f, "SPECIAL-USE"),
            Self::CreateSpecialUse => write!(f, "CREATE-SPECIAL-USE"),
            Self::Metadata => write!(f, "METADATA"),
            Self::Idle => write!(f, "IDLE"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// The capability set advertised by a server.
///
/// All strategy decisions in the engine go through this one set rather
/// than through per-feature marker types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    set: HashSet<Capability>,
}

impl Capabilities {
    /// Creates an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a whitespace separated CAPABILITY line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        line.split_whitespace().map(Capability::parse).collect()
    }

    /// Returns true if the capability is advertised.
    #[must_use]
    pub fn has(&self, capability: &Capability) -> bool {
        self.set.contains(capability)
    }

    /// Adds a capability.
    pub fn insert(&mut self, capability: Capability) {
        self.set.insert(capability);
    }

    /// Removes a capability.
    pub fn remove(&mut self, capability: &Capability) {
        self.set.remove(capability);
    }

    /// Returns an iterator over the advertised capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.set.iter()
    }

    /// Server supports MOVE.
    #[must_use]
    pub fn supports_move(&self) -> bool {
        self.has(&Capability::Move)
    }

    /// Server supports UIDPLUS (APPENDUID, COPYUID, UID EXPUNGE).
    #[must_use]
    pub fn supports_uidplus(&self) -> bool {
        self.has(&Capability::UidPlus)
    }

    /// Server supports SORT.
    #[must_use]
    pub fn supports_sort(&self) -> bool {
        self.has(&Capability::Sort)
    }

    /// Server supports ESORT.
    #[must_use]
    pub fn supports_esort(&self) -> bool {
        self.has(&Capability::ESort)
    }

    /// Server supports SORT=DISPLAY.
    #[must_use]
    pub fn supports_sort_display(&self) -> bool {
        self.has(&Capability::SortDisplay)
    }

    /// Server supports ACL commands.
    #[must_use]
    pub fn supports_acl(&self) -> bool {
        self.has(&Capability::Acl)
    }

    /// Server supports NAMESPACE.
    #[must_use]
    pub fn supports_namespace(&self) -> bool {
        self.has(&Capability::Namespace)
    }

    /// Server supports QUOTA.
    #[must_use]
    pub fn supports_quota(&self) -> bool {
        self.has(&Capability::Quota)
    }

    /// Server announces special-use attributes in LIST.
    #[must_use]
    pub fn supports_special_use(&self) -> bool {
        self.has(&Capability::SpecialUse)
    }

    /// Server accepts `CREATE ... (USE (...))`.
    #[must_use]
    pub fn supports_create_special_use(&self) -> bool {
        self.has(&Capability::CreateSpecialUse)
    }

    /// Server supports METADATA.
    #[must_use]
    pub fn supports_metadata(&self) -> bool {
        self.has(&Capability::Metadata)
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            set: iter.into_iter().collect(),
        }
    }
}
