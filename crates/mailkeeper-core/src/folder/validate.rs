//! Folder name validation.

use crate::config::ImapProperties;
use crate::error::{Error, Result};

const WILDCARDS: [char; 2] = ['%', '*'];

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validates one path segment of a folder name.
///
/// `holds_folders_only` permits a single trailing separator, which
/// mbox-style servers use to create a folder that can only contain other
/// folders.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] describing the first violated rule.
pub fn validate_segment(
    name: &str,
    separator: char,
    props: &ImapProperties,
    holds_folders_only: bool,
) -> Result<()> {
    let stem = if holds_folders_only {
        name.strip_suffix(separator).unwrap_or(name)
    } else {
        name
    };

    if stem.trim().is_empty() {
        return Err(invalid(name, "name is empty"));
    }
    if stem.chars().count() > props.max_mailbox_name_length {
        return Err(invalid(
            name,
            format!("longer than {} characters", props.max_mailbox_name_length),
        ));
    }
    if let Some(c) = stem.chars().find(|c| WILDCARDS.contains(c)) {
        return Err(invalid(name, format!("contains wildcard {c:?}")));
    }
    if let Some(c) = stem.chars().find(|c| props.invalid_chars.contains(*c)) {
        return Err(invalid(name, format!("contains forbidden character {c:?}")));
    }
    if stem.chars().any(char::is_control) {
        return Err(invalid(name, "contains control characters"));
    }
    if stem.contains(separator) {
        return Err(invalid(name, format!("contains separator {separator:?}")));
    }
    Ok(())
}
