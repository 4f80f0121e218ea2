//! The mailbox a session currently has open.

use mailkeeper_imap::{MailboxStatus, Transport};
use tracing::debug;

use crate::cache::is_in_subtree;
use crate::error::{Result, TransportResultExt};

/// How a mailbox is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// EXAMINE.
    ReadOnly,
    /// SELECT.
    ReadWrite,
}

#[derive(Debug, Clone)]
struct OpenMailbox {
    name: String,
    mode: OpenMode,
    status: MailboxStatus,
}

/// Exclusively owned selected-state of one session.
///
/// Reopening the same mailbox in the same mode is free; a different name
/// or mode issues a new SELECT/EXAMINE, which implicitly leaves the
/// previous mailbox without expunging it.
#[derive(Debug, Default)]
pub struct MailboxHandle {
    current: Option<OpenMailbox>,
}

impl MailboxHandle {
    /// Creates a handle with nothing open.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Opens `name` in `mode`, reusing the open mailbox when it matches.
    ///
    /// # Errors
    ///
    /// Maps SELECT/EXAMINE failures against `name`.
    pub async fn open<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        name: &str,
        mode: OpenMode,
    ) -> Result<MailboxStatus> {
        if let Some(open) = &self.current {
            if open.name == name && open.mode == mode {
                return Ok(open.status.clone());
            }
        }
        self.current = None;
        let status = match mode {
            OpenMode::ReadOnly => transport.examine(name).await,
            OpenMode::ReadWrite => transport.select(name).await,
        }
        .on_folder(name)?;
        debug!(folder = name, ?mode, exists = status.exists, "mailbox opened");
        self.current = Some(OpenMailbox {
            name: name.to_string(),
            mode,
            status: status.clone(),
        });
        Ok(status)
    }

    /// Forces the next [`open`](Self::open) to reissue SELECT/EXAMINE.
    pub fn forget(&mut self) {
        self.current = None;
    }

    /// Name of the open mailbox.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_ref().map(|o| o.name.as_str())
    }

    /// Mode of the open mailbox.
    #[must_use]
    pub fn mode(&self) -> Option<OpenMode> {
        self.current.as_ref().map(|o| o.mode)
    }

    /// Leaves the open mailbox without expunging.
    ///
    /// # Errors
    ///
    /// Propagates UNSELECT failures.
    pub async fn release<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        if let Some(open) = self.current.take() {
            transport.unselect().await.on_folder(&open.name)?;
            debug!(folder = %open.name, "mailbox released");
        }
        Ok(())
    }

    /// Whether the open mailbox lies in the subtree of `root`.
    #[must_use]
    pub fn is_open_within(&self, root: &str, separator: char) -> bool {
        self.current()
            .is_some_and(|name| is_in_subtree(name, root, separator))
    }
}
