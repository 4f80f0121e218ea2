//! Message operations: search, fetch, copy, move, delete, flags, append.
//!
//! Bulk operations work in blocks of `block_size` UIDs. Each call
//! registers an [`OperationKey`] first; a colliding call fails at once
//! with [`Error::ConcurrentUse`].

mod append;
mod fetch;
mod search;

use mailkeeper_imap::{Flag, Flags, ResponseCode, Rights, StoreAction, Transport, Uid, UidSet};
use tracing::{debug, warn};

use crate::cache::{INBOX, normalize};
use crate::coordinator::{OperationGuard, OperationKey, OperationType};
use crate::error::{Error, Result};
use crate::handle::OpenMode;
use crate::session::{DefaultFolder, MailSession};

pub use append::{AppendMessage, MARKER_HEADER};
pub use search::{SearchQuery, SortOrder};

fn deleted_flag() -> Flags {
    Flags::from_vec(vec![Flag::Deleted])
}

fn draft_flag() -> Flags {
    Flags::from_vec(vec![Flag::Draft])
}

impl<T: Transport> MailSession<T> {
    /// Registers a message operation with the coordinator.
    pub(crate) fn begin<I, S>(&self, op: OperationType, folders: I) -> Result<OperationGuard>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.engine
            .coordinator()
            .begin(OperationKey::new(op, self.ctx.account.clone(), folders))
    }

    /// Normalized name of an existing folder that holds messages.
    pub(crate) async fn selectable_folder(&mut self, full_name: &str) -> Result<String> {
        let name = normalize(full_name);
        self.check_fail_fast(&name)?;
        let entry = self
            .folder(&name)
            .await?
            .filter(|e| e.exists())
            .ok_or_else(|| Error::NotFound(name.clone()))?;
        if !entry.is_selectable() && name != INBOX {
            return Err(Error::Validation(format!("{name} holds no messages")));
        }
        Ok(name)
    }

    /// Whether removed messages of `folder` go to trash first.
    pub(crate) async fn wants_backup(&mut self, folder: &str, hard: bool) -> Result<bool> {
        if hard || self.engine.properties().hard_delete_msgs || self.ctx.hard_delete {
            return Ok(false);
        }
        Ok(!self.is_in_trash(folder).await?)
    }

    /// Copies or moves `uids` of the open mailbox `source` to `dest`, one
    /// block per command.
    ///
    /// Moves use MOVE when advertised and COPY, STORE `\Deleted`, EXPUNGE
    /// otherwise. For backups, a NONEXISTENT answer means the messages are
    /// already gone and the block is skipped.
    ///
    /// Returns the destination UID of each source UID, when known.
    pub(crate) async fn transfer(
        &mut self,
        source: &str,
        uids: &[Uid],
        dest: &str,
        remove: bool,
        backup: bool,
    ) -> Result<Vec<Option<Uid>>> {
        let native_move = remove && self.transport.capabilities().supports_move();
        let mut mapped = Vec::with_capacity(uids.len());
        for chunk in uids.chunks(self.engine.properties().block_size) {
            let Some(set) = UidSet::from_uids(chunk) else {
                continue;
            };
            let result = if native_move {
                self.transport.uid_move(&set, dest).await
            } else {
                self.transport.uid_copy(&set, dest).await
            };
            let copied = match result {
                Ok(copied) => copied,
                Err(err) if backup && err.has_code(&ResponseCode::NonExistent) => {
                    debug!(folder = source, uids = %set, "messages already gone");
                    mapped.extend(chunk.iter().map(|_| None));
                    continue;
                }
                Err(err) => return Err(self.fail(dest, err)),
            };
            if remove && !native_move {
                self.transport
                    .uid_store(&set, StoreAction::Add, &deleted_flag())
                    .await
                    .map_err(|e| self.fail(source, e))?;
                self.expunge_set(source, &set).await?;
            }
            mapped.extend(
                chunk
                    .iter()
                    .map(|uid| copied.as_ref().and_then(|c| c.dest_for(*uid))),
            );
            debug!(source, dest, count = chunk.len(), remove, "block transferred");
        }
        Ok(mapped)
    }

    /// Flags `uids` of the open mailbox `\Deleted` and expunges them.
    pub(crate) async fn purge(&mut self, source: &str, uids: &[Uid]) -> Result<()> {
        for chunk in uids.chunks(self.engine.properties().block_size) {
            let Some(set) = UidSet::from_uids(chunk) else {
                continue;
            };
            self.transport
                .uid_store(&set, StoreAction::Add, &deleted_flag())
                .await
                .map_err(|e| self.fail(source, e))?;
            self.expunge_set(source, &set).await?;
        }
        Ok(())
    }

    /// UID EXPUNGE with UIDPLUS, plain EXPUNGE otherwise.
    pub(crate) async fn expunge_set(&mut self, source: &str, set: &UidSet) -> Result<()> {
        let result = if self.transport.capabilities().supports_uidplus() {
            self.transport.uid_expunge(set).await
        } else {
            self.transport.expunge().await
        };
        result.map_err(|e| self.fail(source, e))
    }

    /// Copies messages into another folder.
    ///
    /// Returns the destination UID per source UID, `None` where the server
    /// didn't report one.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if either folder is missing
    /// - [`Error::Validation`] if the destination holds no messages
    /// - [`Error::Permission`] without read on the source or insert on the
    ///   destination
    /// - [`Error::QuotaExceeded`] if the destination is full
    /// - [`Error::ConcurrentUse`] if the same folders are being copied
    pub async fn copy_messages(&mut self, source: &str, uids: &[Uid], dest: &str) -> Result<Vec<Option<Uid>>> {
        self.relocate(source, uids, dest, false).await
    }

    /// Moves messages into another folder.
    ///
    /// Moving into the source folder returns the UIDs unchanged.
    ///
    /// # Errors
    ///
    /// As [`copy_messages`](Self::copy_messages), plus
    /// [`Error::Permission`] without delete-message rights on the source.
    pub async fn move_messages(&mut self, source: &str, uids: &[Uid], dest: &str) -> Result<Vec<Option<Uid>>> {
        self.relocate(source, uids, dest, true).await
    }

    async fn relocate(&mut self, source: &str, uids: &[Uid], dest: &str, remove: bool) -> Result<Vec<Option<Uid>>> {
        let source = self.selectable_folder(source).await?;
        let dest = normalize(dest);
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        if remove && source == dest {
            return Ok(uids.iter().copied().map(Some).collect());
        }
        self.check_fail_fast(&dest)?;
        let entry = self
            .folder(&dest)
            .await?
            .filter(|e| e.exists())
            .ok_or_else(|| Error::NotFound(dest.clone()))?;
        if !entry.is_selectable() && dest != INBOX {
            return Err(Error::Validation(format!("{dest} holds no messages")));
        }

        let _op = self.begin(OperationType::MsgCopy, [source.clone(), dest.clone()])?;
        let mut needed = Rights::READ;
        if remove {
            needed |= Rights::DELETE_MESSAGES;
        }
        self.require_rights(&source, needed, if remove { "moving messages" } else { "copying messages" })
            .await?;
        self.require_rights(&dest, Rights::INSERT, "adding messages")
            .await?;

        let mode = if remove { OpenMode::ReadWrite } else { OpenMode::ReadOnly };
        self.open_folder(&source, mode).await?;
        let mapped = self.transfer(&source, uids, &dest, remove, false).await?;
        debug!(%source, %dest, count = uids.len(), remove, "messages transferred");

        let drafts = self.default_folder(DefaultFolder::Drafts).await?;
        let action = if dest == drafts && source != drafts {
            Some(StoreAction::Add)
        } else if source == drafts && dest != drafts {
            Some(StoreAction::Remove)
        } else {
            None
        };
        if let Some(action) = action {
            self.mark_drafts(&dest, &mapped, action).await?;
        }
        Ok(mapped)
    }

    async fn mark_drafts(&mut self, dest: &str, mapped: &[Option<Uid>], action: StoreAction) -> Result<()> {
        let copies: Vec<Uid> = mapped.iter().flatten().copied().collect();
        let Some(set) = UidSet::from_uids(&copies) else {
            return Ok(());
        };
        self.open_folder(dest, OpenMode::ReadWrite).await?;
        match self.transport.uid_store(&set, action, &draft_flag()).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_connection_error() => Err(self.fail(dest, err)),
            Err(err) => {
                warn!(folder = dest, error = %err, "draft flag not updated on copies");
                Ok(())
            }
        }
    }

    /// Deletes messages.
    ///
    /// Unless `hard`, hard deletion is configured or the folder is in
    /// trash, the messages are moved to trash.
    ///
    /// # Errors
    ///
    /// - [`Error::Permission`] if the folder can't be opened read-write or
    ///   the user may not delete messages
    /// - [`Error::NotFound`] if the folder or a needed trash folder is
    ///   missing
    /// - [`Error::ConcurrentUse`] if messages of the folder are being
    ///   deleted already
    pub async fn delete_messages(&mut self, folder: &str, uids: &[Uid], hard: bool) -> Result<()> {
        let name = self.selectable_folder(folder).await?;
        if uids.is_empty() {
            return Ok(());
        }
        let _op = self.begin(OperationType::MsgDelete, [name.clone()])?;
        self.open_folder(&name, OpenMode::ReadWrite).await?;
        self.require_rights(&name, Rights::DELETE_MESSAGES, "deleting messages")
            .await?;

        if self.wants_backup(&name, hard).await? {
            let trash = self.trash_root().await?;
            self.transfer(&name, uids, &trash, true, true).await?;
            debug!(folder = %name, %trash, count = uids.len(), "messages moved to trash");
        } else {
            self.purge(&name, uids).await?;
            debug!(folder = %name, count = uids.len(), "messages deleted");
        }
        Ok(())
    }

    /// Sets or clears system flags.
    ///
    /// Keywords in `flags` are ignored; use
    /// [`update_user_flags`](Self::update_user_flags).
    ///
    /// # Errors
    ///
    /// - [`Error::Permission`] without the rights the flags need
    /// - [`Error::ConcurrentUse`] if flags of the folder are being changed
    pub async fn update_flags(&mut self, folder: &str, uids: &[Uid], flags: &Flags, set: bool) -> Result<()> {
        let name = self.selectable_folder(folder).await?;
        let flags = flags.without_keywords();
        if uids.is_empty() || flags.is_empty() {
            return Ok(());
        }
        let _op = self.begin(OperationType::MsgFlagsUpdate, [name.clone()])?;

        let mut needed = Rights::empty();
        if flags.is_seen() {
            needed |= Rights::KEEP_SEEN;
        }
        if flags.is_deleted() {
            needed |= Rights::DELETE_MESSAGES;
        }
        if flags.iter().any(|f| !matches!(f, Flag::Seen | Flag::Deleted)) {
            needed |= Rights::WRITE;
        }
        self.require_rights(&name, needed, "changing flags").await?;
        self.store(&name, uids, &flags, set).await
    }

    /// Sets or clears keywords.
    ///
    /// # Errors
    ///
    /// - [`Error::Unsupported`] if the folder can't store keywords
    /// - [`Error::Permission`] without write right
    /// - [`Error::ConcurrentUse`] if keywords of the folder are being
    ///   changed
    pub async fn update_user_flags<S: AsRef<str>>(
        &mut self,
        folder: &str,
        uids: &[Uid],
        keywords: &[S],
        set: bool,
    ) -> Result<()> {
        let name = self.selectable_folder(folder).await?;
        if uids.is_empty() || keywords.is_empty() {
            return Ok(());
        }
        let _op = self.begin(OperationType::MsgUserFlagsUpdate, [name.clone()])?;
        self.require_rights(&name, Rights::WRITE, "changing keywords")
            .await?;
        let status = self.open_folder(&name, OpenMode::ReadWrite).await?;
        if !status.permanent_flags.allows_keywords() {
            return Err(Error::Unsupported(format!("user flags in {name}")));
        }
        self.store(&name, uids, &Flags::keywords(keywords), set).await
    }

    async fn store(&mut self, name: &str, uids: &[Uid], flags: &Flags, set: bool) -> Result<()> {
        self.open_folder(name, OpenMode::ReadWrite).await?;
        let action = if set { StoreAction::Add } else { StoreAction::Remove };
        for chunk in uids.chunks(self.engine.properties().block_size) {
            if let Some(uid_set) = UidSet::from_uids(chunk) {
                self.transport
                    .uid_store(&uid_set, action, flags)
                    .await
                    .map_err(|e| self.fail(name, e))?;
            }
        }
        debug!(folder = name, count = uids.len(), set, %flags, "flags stored");
        Ok(())
    }
}
