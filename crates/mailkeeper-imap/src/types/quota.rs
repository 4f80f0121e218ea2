//! QUOTA response data (RFC 9208).

/// A quota resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaResourceName {
    /// Sum of message sizes, in units of 1024 octets.
    Storage,
    /// Number of messages.
    Message,
    /// Any other resource.
    Other(String),
}

impl QuotaResourceName {
    /// Parses a resource name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "STORAGE" => Self::Storage,
            "MESSAGE" => Self::Message,
            _ => Self::Other(s.to_string()),
        }
    }
}

/// Usage and limit of one resource of a quota root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    /// Resource type.
    pub name: QuotaResourceName,
    /// Current usage.
    pub usage: u64,
    /// Limit.
    pub limit: u64,
}
