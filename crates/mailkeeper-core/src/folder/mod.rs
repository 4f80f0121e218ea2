//! Folder lifecycle: create, rename, move, delete, trash and update.
//!
//! Every structural operation follows the same frame:
//!
//! 1. fail-fast check on the folders involved;
//! 2. validation against the cached tree and the user's rights;
//! 3. per-folder locks from the [`Coordinator`](crate::coordinator::Coordinator)
//!    for the whole multi-step run;
//! 4. transport commands, with compensation on failure;
//! 5. invalidation of every cache of the account.
//!
//! Clearing and expunging folder contents lives in [`clear`].

mod clear;
mod validate;

use std::sync::Arc;

use mailkeeper_imap::{
    AclEntry, QuotaResource, ResponseCode, Rights, SearchCriteria, SpecialUse, Transport, UidSet,
};
use tracing::{debug, info, warn};

use crate::acl;
use crate::cache::{FolderEntry, is_in_subtree, normalize, parent_of};
use crate::error::{Error, Result, Warning};
use crate::handle::OpenMode;
use crate::session::MailSession;

pub use validate::validate_segment;

/// Options for [`MailSession::create_folder`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Subscribe after creation; `None` follows the session default.
    pub subscribe: Option<bool>,
    /// Initial ACL entries.
    pub acls: Vec<AclEntry>,
    /// Special-use role to announce.
    pub special_use: Option<SpecialUse>,
    /// Create a folder that can only contain other folders.
    pub holds_folders_only: bool,
}

/// Changes for [`MailSession::update_folder`].
#[derive(Debug, Clone, Default)]
pub struct FolderUpdate {
    /// Complete new ACL set.
    pub acls: Option<Vec<AclEntry>>,
    /// New subscription state.
    pub subscribe: Option<bool>,
}

fn join(parent: Option<&str>, name: &str, separator: char) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}{separator}{name}"),
        _ => name.to_string(),
    }
}

fn last_segment(full_name: &str, separator: char) -> &str {
    full_name
        .rsplit_once(separator)
        .map_or(full_name, |(_, name)| name)
}

/// Rewrites `name` from below `old_root` to below `new_root`.
fn substitute(name: &str, old_root: &str, new_root: &str) -> String {
    name.strip_prefix(old_root)
        .map_or_else(|| name.to_string(), |rest| format!("{new_root}{rest}"))
}

impl<T: Transport> MailSession<T> {
    /// Creates `name` below `parent`, or at the root for `None`.
    ///
    /// Returns the full name of the new folder. A failure after the
    /// folder was created deletes it again before the error surfaces.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`] for names breaking the naming rules
    /// - [`Error::NotFound`] if the parent doesn't exist
    /// - [`Error::Validation`] if the parent can't hold folders or the
    ///   server's folder limit is reached
    /// - [`Error::Permission`] without the create right on the parent
    /// - [`Error::Duplicate`] if the folder exists
    pub async fn create_folder(
        &mut self,
        parent: Option<&str>,
        name: &str,
        options: CreateOptions,
    ) -> Result<String> {
        let parent = parent.map(normalize).filter(|p| !p.is_empty());
        if let Some(parent) = &parent {
            self.check_fail_fast(parent)?;
        }
        let separator = self.separator().await?;
        validate_segment(name, separator, self.engine.properties(), options.holds_folders_only)?;

        match &parent {
            Some(parent) => {
                let entry = self
                    .folder(parent)
                    .await?
                    .filter(|e| e.exists())
                    .ok_or_else(|| Error::NotFound(parent.clone()))?;
                if !entry.has_inferiors() {
                    return Err(Error::Validation(format!("{parent} can't hold subfolders")));
                }
                self.require_rights(parent, Rights::CREATE_MAILBOX, "creating a subfolder")
                    .await?;
            }
            None if !self.engine.properties().root_subfolders_allowed => {
                return Err(Error::Permission {
                    folder: name.to_string(),
                    detail: "folders can't be created at the root level".to_string(),
                });
            }
            None => {}
        }

        let command_name = join(parent.as_deref(), name, separator);
        let full_name = command_name.trim_end_matches(separator).to_string();
        let _lock = self
            .engine
            .coordinator()
            .lock_folders(&self.ctx.account, &[&full_name])
            .await;

        if self.exists(&full_name).await? {
            return Err(Error::Duplicate(full_name));
        }

        let announce = options
            .special_use
            .filter(|_| self.engine.properties().set_special_use_flags);
        let with_create = announce.filter(|_| self.transport.capabilities().supports_create_special_use());
        if let Err(err) = self.transport.create(&command_name, with_create).await {
            return Err(match err.response_code() {
                Some(ResponseCode::Limit) => Error::Validation("too many folders".to_string()),
                Some(ResponseCode::AlreadyExists) => {
                    self.cache.invalidate(&full_name);
                    Error::Duplicate(full_name)
                }
                _ => self.fail(&full_name, err),
            });
        }
        info!(folder = %full_name, "folder created");

        let setup = self
            .finish_create(&full_name, &options, announce.filter(|_| with_create.is_none()))
            .await;
        if let Err(err) = setup {
            warn!(folder = %full_name, error = %err, "folder setup failed, removing folder");
            if let Err(cleanup) = self.transport.delete(&full_name).await {
                warn!(folder = %full_name, error = %cleanup, "removing half-created folder failed");
            }
            self.invalidate_structure();
            return Err(err);
        }
        self.invalidate_structure();
        Ok(full_name)
    }

    async fn finish_create(
        &mut self,
        full_name: &str,
        options: &CreateOptions,
        metadata_use: Option<SpecialUse>,
    ) -> Result<()> {
        if let Some(role) = metadata_use {
            if self.transport.capabilities().supports_metadata() {
                if let Err(err) = self.transport.set_special_use(full_name, Some(role)).await {
                    if err.is_connection_error() {
                        return Err(self.fail(full_name, err));
                    }
                    debug!(folder = full_name, error = %err, "special-use not stored");
                }
            }
        }

        let subscribe = options.subscribe.unwrap_or(self.ctx.subscribe_on_create);
        if subscribe && self.engine.properties().support_subscription {
            self.set_subscribed(full_name, true).await?;
        }

        if !options.acls.is_empty() && self.transport.capabilities().supports_acl() {
            self.rights.remove(full_name);
            let rights = self.my_rights(full_name).await?;
            if rights.is_admin() {
                let current = self.transport.get_acl(full_name).await.map_err(|e| self.fail(full_name, e))?;
                let changes = acl::reconcile(full_name, &current, &options.acls, self.engine.identities())?;
                self.apply_acl(full_name, &changes).await?;
            } else {
                warn!(folder = full_name, "no administer right on new folder, initial ACLs skipped");
                self.warn(Warning::NoAdministerAccessOnInitial {
                    folder: full_name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Subscribes or unsubscribes, recording command failures as warnings.
    ///
    /// Returns whether the server accepted the command.
    pub(crate) async fn set_subscribed(&mut self, full_name: &str, subscribed: bool) -> Result<bool> {
        let result = if subscribed {
            self.transport.subscribe(full_name).await
        } else {
            self.transport.unsubscribe(full_name).await
        };
        match result {
            Ok(()) => Ok(true),
            Err(err) if err.is_connection_error() => Err(self.fail(full_name, err)),
            Err(err) => {
                warn!(folder = full_name, subscribed, error = %err, "subscription change failed");
                self.warn(Warning::SubscriptionFailed {
                    folder: full_name.to_string(),
                    detail: err.to_string(),
                });
                Ok(false)
            }
        }
    }

    /// Keeps a warning for every subscription a broken connection left off.
    fn record_lost_subscriptions(&mut self, names: &[String], err: &Error) {
        for name in names {
            warn!(folder = %name, error = %err, "subscription lost");
            self.warn(Warning::SubscriptionFailed {
                folder: name.clone(),
                detail: err.to_string(),
            });
        }
    }

    /// Subscribed names in the subtree of `root`, parents first.
    async fn subscribed_in_subtree(&mut self, root: &str) -> Result<Vec<String>> {
        if !self.engine.properties().support_subscription {
            return Ok(Vec::new());
        }
        Ok(self
            .cache
            .subtree(&mut self.transport, root)
            .await?
            .iter()
            .filter(|e| e.is_subscribed())
            .map(|e| e.full_name().to_string())
            .collect())
    }

    async fn existing(&mut self, full_name: &str) -> Result<String> {
        let name = normalize(full_name);
        self.check_fail_fast(&name)?;
        if self.exists(&name).await? {
            Ok(name)
        } else {
            Err(Error::NotFound(name))
        }
    }

    async fn reject_default(&mut self, full_name: &str) -> Result<()> {
        if self.is_default_folder(full_name).await? {
            return Err(Error::DefaultFolder(full_name.to_string()));
        }
        Ok(())
    }

    /// Renames a folder within its parent.
    ///
    /// # Errors
    ///
    /// - [`Error::DefaultFolder`] for INBOX and the default folders
    /// - [`Error::NotFound`] if the folder doesn't exist
    /// - [`Error::Duplicate`] if the new name is taken
    /// - [`Error::InvalidName`] for invalid names
    pub async fn rename_folder(&mut self, full_name: &str, new_name: &str) -> Result<String> {
        let full_name = self.existing(full_name).await?;
        self.reject_default(&full_name).await?;
        let separator = self.separator().await?;
        validate_segment(new_name, separator, self.engine.properties(), false)?;

        let target = join(parent_of(&full_name, separator).as_deref(), new_name, separator);
        if target == full_name {
            return Ok(full_name);
        }
        if self.exists(&target).await? {
            return Err(Error::Duplicate(target));
        }
        self.require_rights(&full_name, Rights::DELETE_MAILBOX, "renaming")
            .await?;
        let _lock = self
            .engine
            .coordinator()
            .lock_folders(&self.ctx.account, &[&full_name, &target])
            .await;
        self.rename_subtree(&full_name, &target).await?;
        Ok(target)
    }

    /// RENAME with subscription transfer for the whole subtree.
    ///
    /// Subscriptions are taken off the old names first and put on the new
    /// names afterwards; a failed RENAME puts them back.
    async fn rename_subtree(&mut self, from: &str, to: &str) -> Result<()> {
        let separator = self.separator().await?;
        self.release_subtree(from, separator).await?;
        let subscribed = self.subscribed_in_subtree(from).await?;
        let mut removed = Vec::with_capacity(subscribed.len());
        for name in &subscribed {
            match self.set_subscribed(name, false).await {
                Ok(true) => removed.push(name.clone()),
                Ok(false) => {}
                Err(err) => {
                    self.record_lost_subscriptions(&removed, &err);
                    self.invalidate_structure();
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.transport.rename(from, to).await {
            let err = self.fail(from, err);
            warn!(from, to, error = %err, "rename failed, restoring subscriptions");
            for name in &removed {
                if let Err(restore) = self.set_subscribed(name, true).await {
                    warn!(folder = %name, error = %restore, "restoring subscription failed");
                }
            }
            self.invalidate_structure();
            return Err(err);
        }

        let renamed: Vec<String> = subscribed.iter().map(|name| substitute(name, from, to)).collect();
        for (done, name) in renamed.iter().enumerate() {
            if let Err(err) = self.set_subscribed(name, true).await {
                self.record_lost_subscriptions(&renamed[done..], &err);
                self.invalidate_structure();
                return Err(err);
            }
        }
        info!(from, to, subscriptions = subscribed.len(), "folder renamed");
        self.invalidate_structure();
        Ok(())
    }

    /// Moves a folder below `new_parent` (root for `None`), optionally
    /// renaming it.
    ///
    /// Within one namespace this is a single RENAME. Across namespaces the
    /// subtree is recreated folder by folder, messages and ACLs are copied
    /// and the sources deleted bottom-up; folders created before a failure
    /// are removed again.
    ///
    /// # Errors
    ///
    /// - [`Error::DefaultFolder`] for INBOX and the default folders
    /// - [`Error::Validation`] for a target inside the folder's own subtree
    ///   or a parent that can't hold folders
    /// - [`Error::Duplicate`] if the target exists
    pub async fn move_folder(
        &mut self,
        full_name: &str,
        new_parent: Option<&str>,
        new_name: Option<&str>,
    ) -> Result<String> {
        let full_name = self.existing(full_name).await?;
        self.reject_default(&full_name).await?;
        let separator = self.separator().await?;
        let name = new_name
            .map_or_else(|| last_segment(&full_name, separator).to_string(), str::to_string);
        validate_segment(&name, separator, self.engine.properties(), false)?;

        let new_parent = new_parent.map(normalize).filter(|p| !p.is_empty());
        if let Some(parent) = &new_parent {
            if is_in_subtree(parent, &full_name, separator) {
                return Err(Error::Validation(format!(
                    "{full_name} can't be moved into its own subtree"
                )));
            }
            let entry = self
                .folder(parent)
                .await?
                .filter(|e| e.exists())
                .ok_or_else(|| Error::NotFound(parent.clone()))?;
            if !entry.has_inferiors() {
                return Err(Error::Validation(format!("{parent} can't hold subfolders")));
            }
            self.require_rights(parent, Rights::CREATE_MAILBOX, "moving a folder here")
                .await?;
        } else if !self.engine.properties().root_subfolders_allowed {
            return Err(Error::Permission {
                folder: full_name,
                detail: "folders can't be moved to the root level".to_string(),
            });
        }

        let target = join(new_parent.as_deref(), &name, separator);
        if target == full_name {
            return Ok(full_name);
        }
        if self.exists(&target).await? {
            return Err(Error::Duplicate(target));
        }
        self.require_rights(&full_name, Rights::DELETE_MAILBOX, "moving")
            .await?;

        let _lock = self
            .engine
            .coordinator()
            .lock_folders(&self.ctx.account, &[&full_name, &target])
            .await;
        let namespaces = match self.namespaces().await {
            Ok(namespaces) => namespaces,
            Err(err) => return Err(self.note(&full_name, err)),
        };
        if namespaces.same_namespace(&full_name, &target) {
            self.rename_subtree(&full_name, &target).await?;
        } else {
            self.copy_subtree(&full_name, &target).await?;
        }
        Ok(target)
    }

    /// Recreates the subtree of `source` at `target` and deletes the
    /// sources.
    async fn copy_subtree(&mut self, source: &str, target: &str) -> Result<()> {
        let separator = self.separator().await?;
        let trash = self.is_in_trash(target).await?;
        self.release_subtree(source, separator).await?;
        let folders = self.cache.subtree(&mut self.transport, source).await?;
        debug!(source, target, folders = folders.len(), "copying folder tree across namespaces");

        let mut created: Vec<String> = Vec::new();
        let mut subscribed: Vec<String> = Vec::new();
        for entry in &folders {
            let dest = substitute(entry.full_name(), source, target);
            let step = self
                .copy_folder(entry.full_name(), &dest, entry.is_selectable(), !trash, &mut created)
                .await;
            let step = match step {
                Ok(()) if entry.is_subscribed() && self.engine.properties().support_subscription => {
                    self.set_subscribed(&dest, true).await.map(|ok| {
                        if ok {
                            subscribed.push(dest.clone());
                        }
                    })
                }
                other => other,
            };
            if let Err(err) = step {
                warn!(source, target, error = %err, "folder copy failed, rolling back");
                self.roll_back(&created, &subscribed).await;
                self.invalidate_structure();
                return Err(err);
            }
        }

        for entry in folders.iter().rev() {
            let name = entry.full_name();
            if entry.is_subscribed() && self.engine.properties().support_subscription {
                self.set_subscribed(name, false).await?;
            }
            if !entry.exists() {
                continue;
            }
            match self.transport.delete(name).await {
                Ok(()) => {}
                Err(err) if err.is_connection_error() => {
                    self.invalidate_structure();
                    return Err(self.fail(name, err));
                }
                Err(err) => {
                    warn!(folder = name, error = %err, "source folder left behind");
                    self.warn(Warning::CleanupFailed {
                        folder: name.to_string(),
                        detail: err.to_string(),
                    });
                }
            }
        }
        info!(source, target, folders = folders.len(), "folder tree moved");
        self.invalidate_structure();
        Ok(())
    }

    async fn copy_folder(
        &mut self,
        source: &str,
        dest: &str,
        selectable: bool,
        with_acls: bool,
        created: &mut Vec<String>,
    ) -> Result<()> {
        self.transport.create(dest, None).await.map_err(|e| self.fail(dest, e))?;
        created.push(dest.to_string());

        if selectable {
            self.open_folder(source, OpenMode::ReadOnly).await?;
            let uids = self
                .transport
                .uid_search(&SearchCriteria::All)
                .await
                .map_err(|e| self.fail(source, e))?;
            for chunk in uids.chunks(self.engine.properties().block_size) {
                if let Some(set) = UidSet::from_uids(chunk) {
                    self.transport
                        .uid_copy(&set, dest)
                        .await
                        .map_err(|e| self.fail(dest, e))?;
                }
            }
            self.release_folder().await?;
        }

        if with_acls && self.transport.capabilities().supports_acl() {
            self.copy_acls(source, dest).await?;
        }
        Ok(())
    }

    async fn copy_acls(&mut self, source: &str, dest: &str) -> Result<()> {
        let wanted = match self.transport.get_acl(source).await {
            Ok(entries) => acl::translate(&entries, self.engine.identities()),
            Err(err) if err.is_connection_error() => return Err(self.fail(source, err)),
            Err(err) => {
                debug!(folder = source, error = %err, "source ACL not readable");
                return Ok(());
            }
        };
        let current = self.transport.get_acl(dest).await.map_err(|e| self.fail(dest, e))?;
        match acl::reconcile(dest, &current, &wanted, self.engine.identities()) {
            Ok(changes) => {
                self.apply_acl(dest, &changes).await?;
            }
            Err(err) => warn!(folder = dest, error = %err, "ACLs not carried over"),
        }
        Ok(())
    }

    async fn roll_back(&mut self, created: &[String], subscribed: &[String]) {
        for name in subscribed {
            if let Err(err) = self.transport.unsubscribe(name).await {
                warn!(folder = %name, error = %err, "rollback unsubscribe failed");
            }
        }
        for name in created.iter().rev() {
            if let Err(err) = self.transport.delete(name).await {
                warn!(folder = %name, error = %err, "rollback delete failed");
            }
        }
    }

    /// Deletes a folder and its subtree.
    ///
    /// # Errors
    ///
    /// - [`Error::DefaultFolder`] for INBOX and the default folders
    /// - [`Error::NotFound`] if the folder doesn't exist
    /// - [`Error::Permission`] without the delete right
    pub async fn delete_folder(&mut self, full_name: &str) -> Result<()> {
        let full_name = self.existing(full_name).await?;
        self.reject_default(&full_name).await?;
        self.require_rights(&full_name, Rights::DELETE_MAILBOX, "deleting")
            .await?;
        let _lock = self
            .engine
            .coordinator()
            .lock_folders(&self.ctx.account, &[&full_name])
            .await;
        self.delete_subtree(&full_name).await?;
        info!(folder = %full_name, "folder deleted");
        Ok(())
    }

    /// Unsubscribes and deletes the subtree of `root` bottom-up.
    pub(crate) async fn delete_subtree(&mut self, root: &str) -> Result<()> {
        let separator = self.separator().await?;
        self.release_subtree(root, separator).await?;
        let folders = self.cache.subtree(&mut self.transport, root).await?;
        if self.engine.properties().support_subscription {
            for entry in folders.iter().filter(|e| e.is_subscribed()) {
                self.set_subscribed(entry.full_name(), false).await?;
            }
        }
        let result = self.delete_bottom_up(&folders).await;
        self.invalidate_structure();
        result
    }

    async fn delete_bottom_up(&mut self, folders: &[Arc<FolderEntry>]) -> Result<()> {
        for entry in folders.iter().rev().filter(|e| e.exists()) {
            let name = entry.full_name();
            match self.transport.delete(name).await {
                Ok(()) => {}
                Err(err) if err.has_code(&ResponseCode::NonExistent) => {}
                Err(err) => return Err(self.fail(name, err)),
            }
        }
        Ok(())
    }

    /// Soft-deletes a folder into trash.
    ///
    /// Returns the new full name, or `None` when the folder was deleted
    /// outright because it already lives in trash or trash can't hold
    /// folders. Name collisions in trash get a `_2`, `_3`, ... suffix.
    ///
    /// # Errors
    ///
    /// - [`Error::DefaultFolder`] for INBOX and the default folders
    /// - [`Error::NotFound`] if the folder or the trash folder is missing
    pub async fn trash_folder(&mut self, full_name: &str) -> Result<Option<String>> {
        let full_name = self.existing(full_name).await?;
        self.reject_default(&full_name).await?;
        let trash = self.trash_root().await?;
        let separator = self.separator().await?;
        let trash_holds_folders = self
            .folder(&trash)
            .await?
            .is_some_and(|e| e.has_inferiors());

        if is_in_subtree(&full_name, &trash, separator) || !trash_holds_folders {
            self.delete_folder(&full_name).await?;
            return Ok(None);
        }

        let base = last_segment(&full_name, separator).to_string();
        let mut name = base.clone();
        let mut suffix = 2;
        while self.exists(&join(Some(&trash), &name, separator)).await? {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.move_folder(&full_name, Some(&trash), Some(&name))
            .await
            .map(Some)
    }

    /// Replaces the ACL and/or the subscription state of a folder.
    ///
    /// # Errors
    ///
    /// - [`Error::Permission`] without administer right
    /// - [`Error::Validation`] for an empty ACL or one that takes full
    ///   rights from the owner of a default folder
    /// - [`Error::NoAdminAcl`] if nobody could administer the folder
    pub async fn update_folder(&mut self, full_name: &str, update: FolderUpdate) -> Result<()> {
        let full_name = self.existing(full_name).await?;
        let is_default = self.is_default_folder(&full_name).await?;

        if let Some(acls) = &update.acls {
            if !self.transport.capabilities().supports_acl() {
                return Err(Error::Unsupported("ACL".to_string()));
            }
            if acls.is_empty() {
                return Err(Error::Validation(format!("{full_name} needs at least one ACL entry")));
            }
            self.require_rights(&full_name, Rights::ADMINISTER, "changing permissions")
                .await?;
            if is_default {
                let owner = self.engine.identities().resolve_entity(&self.ctx.user).ok();
                let owner_keeps_all = acls.iter().any(|e| {
                    owner.is_some_and(|o| self.engine.identities().resolve_entity(&e.identifier).ok() == Some(o))
                        && e.rights.contains(Rights::all().without_post())
                });
                if !owner_keeps_all {
                    return Err(Error::Validation(format!(
                        "owner must keep full rights on default folder {full_name}"
                    )));
                }
            }
            let current = self.transport.get_acl(&full_name).await.map_err(|e| self.fail(&full_name, e))?;
            let changes = acl::reconcile(&full_name, &current, acls, self.engine.identities())?;
            if !changes.is_empty() {
                self.apply_acl(&full_name, &changes).await?;
                self.rights.remove(&full_name);
            }
        }

        if let Some(subscribe) = update.subscribe {
            let enabled = self.engine.properties().support_subscription && !self.ctx.ignore_subscription;
            if !enabled {
                debug!(folder = %full_name, "subscription change skipped");
            } else if is_default && !subscribe {
                self.warn(Warning::DefaultFolderUnsubscribe {
                    folder: full_name.clone(),
                });
            } else {
                self.set_subscribed(&full_name, subscribe).await?;
            }
            self.cache.invalidate(&full_name);
        }
        Ok(())
    }

    /// Usage and limits of the quota root of a folder.
    ///
    /// Empty when the server has no QUOTA support.
    ///
    /// # Errors
    ///
    /// Maps GETQUOTAROOT failures.
    pub async fn get_quota(&mut self, full_name: &str) -> Result<Vec<QuotaResource>> {
        let name = normalize(full_name);
        self.check_fail_fast(&name)?;
        if !self.transport.capabilities().supports_quota() {
            return Ok(Vec::new());
        }
        self.transport
            .get_quota_root(&name)
            .await
            .map_err(|e| self.fail(&name, e))
    }
}
