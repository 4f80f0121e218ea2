//! Engine configuration and per-user session context.
//!
//! [`ImapProperties`] holds the server-wide limits and toggles. It
//! deserializes from JSON with every field optional, so a deployment only
//! lists what it changes:
//!
//! ```
//! use mailkeeper_core::ImapProperties;
//!
//! let props = ImapProperties::from_json(r#"{ "block_size": 100 }"#).unwrap();
//! assert_eq!(props.block_size, 100);
//! assert_eq!(props.fetch_limit, 1000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Server-wide limits and toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapProperties {
    /// Messages per bulk command.
    pub block_size: usize,
    /// Folder size above which searching and clearing switch strategy.
    pub fetch_limit: usize,
    /// Longest accepted folder name segment.
    pub max_mailbox_name_length: usize,
    /// Extra characters rejected in folder names.
    pub invalid_chars: String,
    /// Whether the server tracks subscriptions.
    pub support_subscription: bool,
    /// Delete messages without a backup copy in trash.
    pub hard_delete_msgs: bool,
    /// Clear large trash folders by renaming them away.
    pub allow_delete_trash_through_rename: bool,
    /// Folder that receives renamed trash folders before their deletion.
    pub purge_folder: Option<String>,
    /// Mark default folders with special-use attributes.
    pub set_special_use_flags: bool,
    /// Sort in process when the server rejects SORT.
    pub fallback_on_failed_sort: bool,
    /// Use ESORT when advertised.
    pub allow_esort: bool,
    /// Use SORT=DISPLAY keys when advertised.
    pub allow_sort_display: bool,
    /// Let the server evaluate search terms.
    pub imap_search: bool,
    /// Whether folders may be created at the root level.
    pub root_subfolders_allowed: bool,
    /// Lifetime of a folder cache snapshot.
    #[serde(with = "duration_secs")]
    pub folder_cache_timeout: Duration,
    /// How long a failed mailbox short-circuits new calls.
    #[serde(with = "duration_secs")]
    pub fail_fast_cooldown: Duration,
    /// Read timeout for regular commands.
    #[serde(with = "option_duration_secs")]
    pub read_timeout: Option<Duration>,
    /// Read timeout for long search/sort commands.
    #[serde(with = "option_duration_secs")]
    pub filter_read_timeout: Option<Duration>,
}

impl Default for ImapProperties {
    fn default() -> Self {
        Self {
            block_size: 1000,
            fetch_limit: 1000,
            max_mailbox_name_length: 60,
            invalid_chars: String::new(),
            support_subscription: true,
            hard_delete_msgs: false,
            allow_delete_trash_through_rename: false,
            purge_folder: None,
            set_special_use_flags: true,
            fallback_on_failed_sort: true,
            allow_esort: true,
            allow_sort_display: false,
            imap_search: true,
            root_subfolders_allowed: true,
            folder_cache_timeout: Duration::from_secs(360),
            fail_fast_cooldown: Duration::from_secs(10),
            read_timeout: None,
            filter_read_timeout: None,
        }
    }
}

impl ImapProperties {
    /// Parses properties from JSON; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed or a limit is zero.
    pub fn from_json(json: &str) -> Result<Self> {
        let props: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        props.validate()?;
        Ok(props)
    }

    /// Creates a properties builder.
    #[must_use]
    pub fn builder() -> ImapPropertiesBuilder {
        ImapPropertiesBuilder::default()
    }

    /// Checks the limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first zero limit.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("block_size", self.block_size),
            ("fetch_limit", self.fetch_limit),
            ("max_mailbox_name_length", self.max_mailbox_name_length),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Raises zero limits to one. Struct literals bypass [`validate`](Self::validate).
    #[must_use]
    pub(crate) fn clamped(mut self) -> Self {
        for (name, value) in [
            ("block_size", &mut self.block_size),
            ("fetch_limit", &mut self.fetch_limit),
            ("max_mailbox_name_length", &mut self.max_mailbox_name_length),
        ] {
            if *value == 0 {
                warn!(limit = name, "zero limit raised to one");
                *value = 1;
            }
        }
        self
    }
}

/// Builder for [`ImapProperties`].
#[derive(Debug, Clone, Default)]
pub struct ImapPropertiesBuilder {
    props: ImapProperties,
}

impl ImapPropertiesBuilder {
    /// Sets the bulk block size.
    #[must_use]
    pub const fn block_size(mut self, size: usize) -> Self {
        self.props.block_size = size;
        self
    }

    /// Sets the fetch limit.
    #[must_use]
    pub const fn fetch_limit(mut self, limit: usize) -> Self {
        self.props.fetch_limit = limit;
        self
    }

    /// Sets the maximum name length.
    #[must_use]
    pub const fn max_mailbox_name_length(mut self, length: usize) -> Self {
        self.props.max_mailbox_name_length = length;
        self
    }

    /// Sets extra invalid characters.
    #[must_use]
    pub fn invalid_chars(mut self, chars: impl Into<String>) -> Self {
        self.props.invalid_chars = chars.into();
        self
    }

    /// Sets whether subscriptions are supported.
    #[must_use]
    pub const fn support_subscription(mut self, enabled: bool) -> Self {
        self.props.support_subscription = enabled;
        self
    }

    /// Sets the hard-delete default for messages.
    #[must_use]
    pub const fn hard_delete_msgs(mut self, enabled: bool) -> Self {
        self.props.hard_delete_msgs = enabled;
        self
    }

    /// Enables trash-through-rename.
    #[must_use]
    pub const fn allow_delete_trash_through_rename(mut self, enabled: bool) -> Self {
        self.props.allow_delete_trash_through_rename = enabled;
        self
    }

    /// Sets the purge folder.
    #[must_use]
    pub fn purge_folder(mut self, folder: impl Into<String>) -> Self {
        self.props.purge_folder = Some(folder.into());
        self
    }

    /// Sets whether special-use attributes are set on default folders.
    #[must_use]
    pub const fn set_special_use_flags(mut self, enabled: bool) -> Self {
        self.props.set_special_use_flags = enabled;
        self
    }

    /// Sets the SORT fallback toggle.
    #[must_use]
    pub const fn fallback_on_failed_sort(mut self, enabled: bool) -> Self {
        self.props.fallback_on_failed_sort = enabled;
        self
    }

    /// Sets the ESORT toggle.
    #[must_use]
    pub const fn allow_esort(mut self, enabled: bool) -> Self {
        self.props.allow_esort = enabled;
        self
    }

    /// Sets the SORT=DISPLAY toggle.
    #[must_use]
    pub const fn allow_sort_display(mut self, enabled: bool) -> Self {
        self.props.allow_sort_display = enabled;
        self
    }

    /// Sets whether search terms go to the server.
    #[must_use]
    pub const fn imap_search(mut self, enabled: bool) -> Self {
        self.props.imap_search = enabled;
        self
    }

    /// Sets whether root-level folders may be created.
    #[must_use]
    pub const fn root_subfolders_allowed(mut self, allowed: bool) -> Self {
        self.props.root_subfolders_allowed = allowed;
        self
    }

    /// Sets the folder cache lifetime.
    #[must_use]
    pub const fn folder_cache_timeout(mut self, timeout: Duration) -> Self {
        self.props.folder_cache_timeout = timeout;
        self
    }

    /// Sets the fail-fast cooldown.
    #[must_use]
    pub const fn fail_fast_cooldown(mut self, cooldown: Duration) -> Self {
        self.props.fail_fast_cooldown = cooldown;
        self
    }

    /// Sets the regular read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.props.read_timeout = Some(timeout);
        self
    }

    /// Sets the read timeout for search and sort.
    #[must_use]
    pub const fn filter_read_timeout(mut self, timeout: Duration) -> Self {
        self.props.filter_read_timeout = Some(timeout);
        self
    }

    /// Builds the properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a limit is zero.
    pub fn build(self) -> Result<ImapProperties> {
        self.props.validate()?;
        Ok(self.props)
    }
}

/// Names of the user's default folders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultFolders {
    /// Trash folder.
    pub trash: Option<String>,
    /// Drafts folder.
    pub drafts: Option<String>,
    /// Sent folder.
    pub sent: Option<String>,
    /// Spam folder.
    pub spam: Option<String>,
}

/// Per-user toggles and identity for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Account the session belongs to.
    pub account: String,
    /// Session identifier, unique within the account.
    pub session: String,
    /// ACL identifier of the logged-in user.
    pub user: String,
    /// Treat every folder as subscribed.
    #[serde(default)]
    pub ignore_subscription: bool,
    /// Hard-delete default for this user.
    #[serde(default)]
    pub hard_delete: bool,
    /// Subscribe folders right after creating them.
    #[serde(default = "default_true")]
    pub subscribe_on_create: bool,
    /// Configured default folder names.
    #[serde(default)]
    pub default_folders: DefaultFolders,
}

const fn default_true() -> bool {
    true
}

impl SessionContext {
    /// Creates a context with default toggles.
    #[must_use]
    pub fn new(account: impl Into<String>, session: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            session: session.into(),
            user: user.into(),
            ignore_subscription: false,
            hard_delete: false,
            subscribe_on_create: true,
            default_folders: DefaultFolders::default(),
        }
    }

    /// Sets the trash folder name.
    #[must_use]
    pub fn with_trash(mut self, name: impl Into<String>) -> Self {
        self.default_folders.trash = Some(name.into());
        self
    }

    /// Sets the drafts folder name.
    #[must_use]
    pub fn with_drafts(mut self, name: impl Into<String>) -> Self {
        self.default_folders.drafts = Some(name.into());
        self
    }

    /// Sets the sent folder name.
    #[must_use]
    pub fn with_sent(mut self, name: impl Into<String>) -> Self {
        self.default_folders.sent = Some(name.into());
        self
    }

    /// Sets the spam folder name.
    #[must_use]
    pub fn with_spam(mut self, name: impl Into<String>) -> Self {
        self.default_folders.spam = Some(name.into());
        self
    }

    /// Sets whether subscriptions are ignored.
    #[must_use]
    pub const fn ignore_subscription(mut self, ignore: bool) -> Self {
        self.ignore_subscription = ignore;
        self
    }

    /// Sets the hard-delete default.
    #[must_use]
    pub const fn hard_delete(mut self, hard: bool) -> Self {
        self.hard_delete = hard;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_secs))
    }
}
