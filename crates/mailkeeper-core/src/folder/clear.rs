//! Emptying folders: expunge, clear and trash-through-rename.

use mailkeeper_imap::{AclEntry, Rights, SearchCriteria, SpecialUse, Transport, UidSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acl;
use crate::coordinator::OperationType;
use crate::error::Result;
use crate::handle::OpenMode;
use crate::session::MailSession;

impl<T: Transport> MailSession<T> {
    /// Removes the messages flagged `\Deleted` from a folder.
    ///
    /// Unless `hard`, hard deletion is configured or the folder is in
    /// trash, the messages are copied to trash first.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`](crate::Error::NotFound) if the folder or a
    ///   needed trash folder is missing
    /// - [`Error::Validation`](crate::Error::Validation) if the folder
    ///   holds no messages
    /// - [`Error::Permission`](crate::Error::Permission) without read and
    ///   delete-message rights
    pub async fn expunge_folder(&mut self, full_name: &str, hard: bool) -> Result<()> {
        let name = self.selectable_folder(full_name).await?;
        let _op = self.begin(OperationType::MsgDelete, [name.clone()])?;
        self.require_rights(&name, Rights::READ | Rights::DELETE_MESSAGES, "expunging")
            .await?;
        let backup = self.wants_backup(&name, hard).await?;

        self.open_folder(&name, OpenMode::ReadWrite).await?;
        let deleted = self
            .transport
            .uid_search(&SearchCriteria::Deleted)
            .await
            .map_err(|e| self.fail(&name, e))?;
        if deleted.is_empty() {
            return Ok(());
        }

        if backup {
            let trash = self.trash_root().await?;
            self.transfer(&name, &deleted, &trash, false, true).await?;
        }
        for chunk in deleted.chunks(self.engine.properties().block_size) {
            if let Some(set) = UidSet::from_uids(chunk) {
                self.expunge_set(&name, &set).await?;
            }
        }
        debug!(folder = %name, expunged = deleted.len(), backup, "folder expunged");
        Ok(())
    }

    /// Removes every message of a folder.
    ///
    /// Messages go to trash block by block unless the deletion is hard or
    /// the folder is in trash. A trash folder holding more than
    /// `fetch_limit` messages is emptied by renaming it away and recreating
    /// it when that is enabled; if any step of that fails, the folder is
    /// emptied message by message instead.
    ///
    /// # Errors
    ///
    /// As [`expunge_folder`](Self::expunge_folder).
    pub async fn clear_folder(&mut self, full_name: &str, hard: bool) -> Result<()> {
        let name = self.selectable_folder(full_name).await?;
        let _op = self.begin(OperationType::MsgDelete, [name.clone()])?;
        self.require_rights(&name, Rights::READ | Rights::DELETE_MESSAGES, "clearing")
            .await?;
        let _lock = self
            .engine
            .coordinator()
            .lock_folders(&self.ctx.account, &[&name])
            .await;

        let in_trash = self.is_in_trash(&name).await?;
        let status = self.open_folder(&name, OpenMode::ReadWrite).await?;
        let props = self.engine.properties();
        let by_rename = in_trash
            && props.allow_delete_trash_through_rename
            && usize::try_from(status.exists).unwrap_or(usize::MAX) > props.fetch_limit;
        if by_rename && name == self.trash_root().await? {
            match self.trash_through_rename(&name).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(folder = %name, error = %err, "trash-through-rename failed, clearing messages");
                    self.open_folder(&name, OpenMode::ReadWrite).await?;
                }
            }
        }

        let uids = self
            .transport
            .uid_search(&SearchCriteria::All)
            .await
            .map_err(|e| self.fail(&name, e))?;
        if uids.is_empty() {
            return Ok(());
        }
        if !in_trash && self.wants_backup(&name, hard).await? {
            let trash = self.trash_root().await?;
            self.transfer(&name, &uids, &trash, true, true).await?;
        } else {
            self.purge(&name, &uids).await?;
        }
        info!(folder = %name, removed = uids.len(), "folder cleared");
        Ok(())
    }

    /// Empties a folder by renaming it to a random name and recreating it.
    ///
    /// The special-use role, the ACL and the subscription are carried over
    /// to the new folder. The renamed folder keeps its contents under the
    /// purge folder when one is configured and exists; otherwise it is
    /// queued for deletion by [`run_deferred`](Self::run_deferred). A
    /// failure undoes the rename.
    async fn trash_through_rename(&mut self, name: &str) -> Result<()> {
        let separator = self.separator().await?;
        let entry = self.folder(name).await?;
        let special_use = entry.as_ref().and_then(|e| e.special_use());
        let subscribed = entry.as_ref().is_some_and(|e| e.is_subscribed())
            && self.engine.properties().support_subscription;
        let saved_acl = if self.transport.capabilities().supports_acl() {
            self.transport.get_acl(name).await.ok()
        } else {
            None
        };
        let suffix = Uuid::new_v4().simple();
        let purge_root = self.engine.properties().purge_folder.clone();
        let (temp, into_purge) = match purge_root {
            Some(root) if self.exists(&root).await? => {
                let base = name.rsplit(separator).next().unwrap_or(name);
                (format!("{root}{separator}{base}-{suffix}"), true)
            }
            _ => (format!("{name}-{suffix}"), false),
        };

        self.release_subtree(name, separator).await?;
        // RENAME carries the special-use attribute along.
        let cleared = special_use.filter(|_| self.transport.capabilities().supports_metadata());
        if cleared.is_some() {
            if let Err(err) = self.transport.set_special_use(name, None).await {
                return Err(self.fail(name, err));
            }
        }
        if let Err(err) = self.transport.rename(name, &temp).await {
            let err = self.fail(name, err);
            self.restore_special_use(name, cleared).await;
            return Err(err);
        }

        let with_create = special_use.filter(|_| self.transport.capabilities().supports_create_special_use());
        if let Err(err) = self.transport.create(name, with_create).await {
            let err = self.fail(name, err);
            self.revert_rename(&temp, name, false).await;
            self.restore_special_use(name, cleared).await;
            return Err(err);
        }
        if special_use.is_some() && with_create.is_none() && self.transport.capabilities().supports_metadata() {
            if let Err(err) = self.transport.set_special_use(name, special_use).await {
                debug!(folder = name, error = %err, "special-use not restored");
            }
        }

        if let Some(saved) = saved_acl {
            if let Err(err) = self.restore_acl(name, &saved).await {
                self.revert_rename(&temp, name, true).await;
                self.restore_special_use(name, cleared).await;
                return Err(err);
            }
        }
        if subscribed {
            self.set_subscribed(name, true).await?;
        }

        info!(folder = name, renamed = %temp, "trash emptied through rename");
        if !into_purge {
            self.pending_purges.push(temp);
        }
        self.invalidate_structure();
        Ok(())
    }

    async fn restore_acl(&mut self, name: &str, saved: &[AclEntry]) -> Result<()> {
        let current = self.transport.get_acl(name).await.map_err(|e| self.fail(name, e))?;
        let changes = acl::reconcile(name, &current, saved, self.engine.identities())?;
        self.apply_acl(name, &changes).await?;
        Ok(())
    }

    async fn restore_special_use(&mut self, name: &str, special_use: Option<SpecialUse>) {
        if special_use.is_some() {
            if let Err(err) = self.transport.set_special_use(name, special_use).await {
                warn!(folder = name, error = %err, "restoring special-use failed");
            }
        }
    }

    async fn revert_rename(&mut self, temp: &str, name: &str, recreated: bool) {
        if recreated {
            if let Err(err) = self.transport.delete(name).await {
                warn!(folder = name, error = %err, "removing recreated folder failed");
            }
        }
        if let Err(err) = self.transport.rename(temp, name).await {
            warn!(folder = name, renamed = temp, error = %err, "reverting rename failed");
        }
        self.invalidate_structure();
    }
}
