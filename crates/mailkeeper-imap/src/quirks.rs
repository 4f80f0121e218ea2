//! Server family detection.
//!
//! Mailbox naming differs between server families in ways the capability
//! list doesn't reveal. Gmail keeps its system folders under a localized
//! bracketed root (`[Gmail]`, `[Google Mail]`), so default folders there
//! can't be derived from the personal prefix alone.

use tracing::debug;

use crate::types::{Capabilities, Capability};

/// Known IMAP server families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerType {
    /// Anything not recognized.
    #[default]
    Unknown,
    /// Gmail / Google Workspace.
    Gmail,
    /// Microsoft Exchange Online and Outlook.com.
    Outlook,
    /// Dovecot.
    Dovecot,
    /// Courier IMAP.
    Courier,
    /// Cyrus IMAP.
    Cyrus,
}

/// Greeting fragments, checked in order.
const GREETING_MARKERS: [(&str, ServerType); 7] = [
    ("gimap", ServerType::Gmail),
    ("gmail", ServerType::Gmail),
    ("outlook", ServerType::Outlook),
    ("microsoft", ServerType::Outlook),
    ("dovecot", ServerType::Dovecot),
    ("courier", ServerType::Courier),
    ("cyrus", ServerType::Cyrus),
];

const GMAIL_HOSTS: [&str; 2] = ["gmail.com", "googlemail.com"];

impl ServerType {
    /// Guesses the family from host name, capabilities and greeting, in
    /// that order of trust.
    #[must_use]
    pub fn detect(capabilities: &Capabilities, greeting: Option<&str>, host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if GMAIL_HOSTS.iter().any(|h| host.ends_with(h)) {
            return Self::Gmail;
        }

        let gmail_extension = capabilities.iter().any(|cap| {
            matches!(cap, Capability::Unknown(name) if name.to_ascii_uppercase().starts_with("X-GM-"))
        });
        if gmail_extension {
            return Self::Gmail;
        }

        let greeting = greeting.map(str::to_ascii_lowercase).unwrap_or_default();
        GREETING_MARKERS
            .iter()
            .find(|(marker, _)| greeting.contains(marker))
            .map_or(Self::Unknown, |(_, server)| *server)
    }
}

/// What the engine adjusts per server family.
#[derive(Debug, Clone, Default)]
pub struct ServerQuirks {
    /// The detected family.
    pub server_type: ServerType,
    /// System folders sit under a bracketed, localized root.
    pub bracketed_system_root: bool,
}

impl ServerQuirks {
    /// Detects the family and derives its quirks.
    #[must_use]
    pub fn detect(capabilities: &Capabilities, greeting: Option<&str>, host: &str) -> Self {
        let server_type = ServerType::detect(capabilities, greeting, host);
        debug!(?server_type, host, "detected server family");
        Self {
            server_type,
            bracketed_system_root: server_type == ServerType::Gmail,
        }
    }
}
