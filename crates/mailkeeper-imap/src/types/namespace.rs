//! NAMESPACE response data (RFC 2342).

/// One namespace descriptor: a prefix and its hierarchy delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDescriptor {
    /// Prefix, usually ending in the delimiter (e.g. `Other Users/`).
    pub prefix: String,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delimiter: Option<char>,
}

impl NamespaceDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(prefix: impl Into<String>, delimiter: Option<char>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter,
        }
    }
}

/// The three namespace lists returned by NAMESPACE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    /// The user's own mailboxes.
    pub personal: Vec<NamespaceDescriptor>,
    /// Other users' mailboxes.
    pub other_users: Vec<NamespaceDescriptor>,
    /// Shared mailboxes.
    pub shared: Vec<NamespaceDescriptor>,
}
