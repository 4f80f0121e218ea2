//! APPEND with UID recovery.
//!
//! Every appended message carries a marker header with a random value.
//! When the server answers with APPENDUID the UID is taken from there;
//! otherwise the folder is searched for the marker afterwards.

use mailkeeper_imap::{Flags, Rights, SearchCriteria, Transport, Uid};
use tracing::debug;
use uuid::Uuid;

use crate::cache::{INBOX, normalize};
use crate::coordinator::OperationType;
use crate::error::{Error, ErrorKind, Result};
use crate::handle::OpenMode;
use crate::session::MailSession;

/// Header carrying the append marker.
pub const MARKER_HEADER: &str = "X-Mailkeeper-Marker";

/// A message to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendMessage {
    /// RFC 5322 message text.
    pub raw: Vec<u8>,
    /// Flags to set on the stored message.
    pub flags: Flags,
}

impl AppendMessage {
    /// A message without flags.
    #[must_use]
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: raw.into(),
            flags: Flags::new(),
        }
    }

    /// Sets the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }
}

fn with_marker(raw: &[u8], marker: &str) -> Vec<u8> {
    let mut out = format!("{MARKER_HEADER}: {marker}\r\n").into_bytes();
    out.extend_from_slice(raw);
    out
}

impl<T: Transport> MailSession<T> {
    /// Appends messages to a folder.
    ///
    /// Keywords are dropped when the folder can't store them. Returns the
    /// new UID of each message, `None` where it couldn't be determined.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for a missing folder
    /// - [`Error::Permission`] without insert right
    /// - [`Error::QuotaExceeded`] when the folder is full; for the sent
    ///   folder the error names it
    /// - [`Error::ConcurrentUse`] if the folder is being appended to
    pub async fn append_messages(&mut self, folder: &str, messages: &[AppendMessage]) -> Result<Vec<Option<Uid>>> {
        let name = normalize(folder);
        self.check_fail_fast(&name)?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        if name != INBOX && !self.exists(&name).await? {
            return Err(Error::NotFound(name));
        }
        let _op = self.begin(OperationType::MsgAppend, [name.clone()])?;
        self.require_rights(&name, Rights::INSERT, "adding messages")
            .await?;

        let keywords_allowed = if messages.iter().any(|m| m.flags.has_keywords()) {
            match self.open_folder(&name, OpenMode::ReadOnly).await {
                Ok(status) => status.permanent_flags.allows_keywords(),
                Err(err) if err.kind() == ErrorKind::Connection => return Err(err),
                Err(_) => false,
            }
        } else {
            true
        };

        let mut uids = Vec::with_capacity(messages.len());
        let mut unresolved: Vec<(usize, String)> = Vec::new();
        for (index, message) in messages.iter().enumerate() {
            let marker = Uuid::new_v4().to_string();
            let flags = if keywords_allowed {
                message.flags.clone()
            } else {
                message.flags.without_keywords()
            };
            let raw = with_marker(&message.raw, &marker);
            match self.transport.append(&name, &flags, &raw).await {
                Ok(Some(assigned)) => uids.push(assigned.uids.first().copied()),
                Ok(None) => {
                    uids.push(None);
                    unresolved.push((index, marker));
                }
                Err(err) => return Err(self.fail(&name, err)),
            }
        }

        if self.handle.current() == Some(name.as_str()) {
            self.handle.forget();
        }
        if !unresolved.is_empty() {
            self.resolve_markers(&name, &unresolved, &mut uids).await?;
        }
        debug!(folder = %name, count = messages.len(), searched = unresolved.len(), "messages appended");
        Ok(uids)
    }

    async fn resolve_markers(
        &mut self,
        name: &str,
        unresolved: &[(usize, String)],
        uids: &mut [Option<Uid>],
    ) -> Result<()> {
        self.open_folder(name, OpenMode::ReadOnly).await?;
        for (index, marker) in unresolved {
            let criteria = SearchCriteria::Header(MARKER_HEADER.to_string(), marker.clone());
            let found = self
                .transport
                .uid_search(&criteria)
                .await
                .map_err(|e| self.fail(name, e))?;
            if let Some(slot) = uids.get_mut(*index) {
                *slot = found.last().copied();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_goes_first() {
        let raw = with_marker(b"Subject: x\r\n\r\nbody", "abc");
        assert!(raw.starts_with(b"X-Mailkeeper-Marker: abc\r\nSubject: x"));
    }
}
