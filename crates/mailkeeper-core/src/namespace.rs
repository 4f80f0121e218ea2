//! Namespace resolution (RFC 2342).
//!
//! Classifies full names against the personal, other-users and shared
//! roots and derives the prefix under which default folders live.

use mailkeeper_imap::{NamespaceDescriptor, Namespaces, Transport};
use tracing::{debug, warn};

use crate::cache::{FolderCache, INBOX};
use crate::error::{Error, Result};

/// Namespace category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamespaceCategory {
    /// The user's own folders.
    Personal,
    /// Other users' folders.
    OtherUsers,
    /// Shared folders.
    Shared,
}

/// One namespace root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    prefix: String,
    delimiter: Option<char>,
    category: NamespaceCategory,
}

impl Namespace {
    /// Creates a namespace.
    #[must_use]
    pub fn new(prefix: impl Into<String>, delimiter: Option<char>, category: NamespaceCategory) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter,
            category,
        }
    }

    fn from_descriptor(d: &NamespaceDescriptor, category: NamespaceCategory) -> Self {
        Self::new(d.prefix.clone(), d.delimiter, category)
    }

    /// Prefix as announced, usually ending with the delimiter.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Hierarchy delimiter.
    #[must_use]
    pub const fn delimiter(&self) -> Option<char> {
        self.delimiter
    }

    /// Category.
    #[must_use]
    pub const fn category(&self) -> NamespaceCategory {
        self.category
    }

    /// The prefix as a folder name, without trailing delimiter.
    #[must_use]
    pub fn full_name(&self) -> &str {
        match self.delimiter {
            Some(d) => self.prefix.strip_suffix(d).unwrap_or(&self.prefix),
            None => &self.prefix,
        }
    }

    /// Whether `full_name` lies in this namespace.
    #[must_use]
    pub fn contains(&self, full_name: &str) -> bool {
        self.prefix.is_empty() || full_name.starts_with(&self.prefix) || full_name == self.full_name()
    }
}

/// All namespaces of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceSet {
    personal: Vec<Namespace>,
    other_users: Vec<Namespace>,
    shared: Vec<Namespace>,
}

impl NamespaceSet {
    /// Builds the set from a NAMESPACE response.
    #[must_use]
    pub fn from_response(response: &Namespaces) -> Self {
        let convert = |list: &[NamespaceDescriptor], category| {
            list.iter()
                .map(|d| Namespace::from_descriptor(d, category))
                .collect::<Vec<_>>()
        };
        Self {
            personal: convert(&response.personal, NamespaceCategory::Personal),
            other_users: convert(&response.other_users, NamespaceCategory::OtherUsers),
            shared: convert(&response.shared, NamespaceCategory::Shared),
        }
    }

    /// A single personal namespace with `prefix`.
    #[must_use]
    pub fn personal_only(prefix: impl Into<String>, separator: char) -> Self {
        Self {
            personal: vec![Namespace::new(prefix, Some(separator), NamespaceCategory::Personal)],
            ..Self::default()
        }
    }

    /// Personal namespaces.
    #[must_use]
    pub fn personal(&self) -> &[Namespace] {
        &self.personal
    }

    /// Other-users namespaces.
    #[must_use]
    pub fn other_users(&self) -> &[Namespace] {
        &self.other_users
    }

    /// Shared namespaces.
    #[must_use]
    pub fn shared(&self) -> &[Namespace] {
        &self.shared
    }

    fn all(&self) -> impl Iterator<Item = &Namespace> {
        self.personal
            .iter()
            .chain(&self.other_users)
            .chain(&self.shared)
    }

    /// Classifies a full name; the longest matching prefix wins, ties go
    /// to personal, then other users, then shared.
    #[must_use]
    pub fn classify(&self, full_name: &str) -> Option<&Namespace> {
        let mut best: Option<&Namespace> = None;
        for ns in self.all().filter(|ns| ns.contains(full_name)) {
            if best.is_none_or(|b| ns.prefix.len() > b.prefix.len()) {
                best = Some(ns);
            }
        }
        best
    }

    /// Whether two names fall into the same namespace root.
    #[must_use]
    pub fn same_namespace(&self, a: &str, b: &str) -> bool {
        self.classify(a) == self.classify(b)
    }

    /// Whether `full_name` is a namespace root itself.
    #[must_use]
    pub fn is_root(&self, full_name: &str) -> bool {
        self.all()
            .any(|ns| !ns.prefix.is_empty() && ns.full_name() == full_name)
    }
}

/// Session-scoped namespace lookups.
#[derive(Debug, Default)]
pub struct NamespaceResolver {
    namespaces: Option<NamespaceSet>,
    default_prefix: Option<String>,
}

impl NamespaceResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the namespaces, asking the server once per session.
    ///
    /// Without the NAMESPACE capability, or when the command fails, the
    /// whole tree counts as one personal namespace.
    ///
    /// # Errors
    ///
    /// Propagates connection failures and LIST failures of the fallback.
    pub async fn namespaces<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        cache: &FolderCache,
    ) -> Result<&NamespaceSet> {
        if self.namespaces.is_none() {
            let set = if transport.capabilities().supports_namespace() {
                match transport.namespace().await {
                    Ok(response) if !response.personal.is_empty() => NamespaceSet::from_response(&response),
                    Ok(_) => NamespaceSet::personal_only("", cache.separator(transport).await?),
                    Err(err) if err.is_connection_error() => {
                        return Err(Error::Connection(err.to_string()));
                    }
                    Err(err) => {
                        warn!(error = %err, "NAMESPACE failed, assuming a single personal namespace");
                        NamespaceSet::personal_only("", cache.separator(transport).await?)
                    }
                }
            } else {
                NamespaceSet::personal_only("", cache.separator(transport).await?)
            };
            debug!(?set, "namespaces resolved");
            self.namespaces = Some(set);
        }
        Ok(self.namespaces.get_or_insert_with(NamespaceSet::default))
    }

    /// Returns the prefix default folders are created under.
    ///
    /// Looks for a bracketed system root (`[Gmail]/`) first when the server
    /// uses one, then the first personal namespace, then `INBOX` plus the
    /// separator when root-level folders are not allowed.
    ///
    /// # Errors
    ///
    /// Propagates connection and LIST failures.
    pub async fn default_prefix<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        cache: &FolderCache,
        bracketed_system_root: bool,
        root_subfolders_allowed: bool,
    ) -> Result<String> {
        if let Some(prefix) = &self.default_prefix {
            return Ok(prefix.clone());
        }
        let separator = cache.separator(transport).await?;

        let mut prefix = None;
        if bracketed_system_root {
            prefix = cache
                .children(transport, None, false)
                .await?
                .iter()
                .map(|e| e.full_name())
                .find(|n| n.starts_with('[') && n.ends_with(']'))
                .map(|n| format!("{n}{separator}"));
        }
        if prefix.is_none() && transport.capabilities().supports_namespace() {
            prefix = self
                .namespaces(transport, cache)
                .await?
                .personal()
                .first()
                .map(|ns| ns.prefix().to_string())
                .filter(|p| !p.is_empty());
        }
        let prefix = prefix.unwrap_or_else(|| {
            if root_subfolders_allowed {
                String::new()
            } else {
                format!("{INBOX}{separator}")
            }
        });

        debug!(%prefix, "default folder prefix resolved");
        self.default_prefix = Some(prefix.clone());
        Ok(prefix)
    }
}
