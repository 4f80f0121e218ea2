//! Engine and per-session state.
//!
//! An [`Engine`] owns everything shared between sessions: configuration,
//! the folder cache registry, the concurrency coordinator and the identity
//! directory. A [`MailSession`] binds one authenticated [`Transport`] to a
//! [`SessionContext`] and carries the state that lives exactly as long as
//! that connection: the open mailbox, the namespace resolution, the rights
//! cache, the fetch fallback level and collected warnings.
//!
//! Folder operations live in [`crate::folder`], message operations in
//! [`crate::message`]; both are methods on [`MailSession`].

use std::collections::HashMap;
use std::sync::Arc;

use mailkeeper_imap::{
    FetchProfile, MailboxStatus, ResponseCode, Rights, ServerQuirks, SpecialUse, Transport,
};
use tracing::{debug, info, warn};

use crate::acl::{self, AclChanges};
use crate::cache::{CacheRegistry, FolderCache, FolderEntry, INBOX, is_in_subtree, normalize};
use crate::clock::{Clock, SystemClock};
use crate::config::{ImapProperties, SessionContext};
use crate::coordinator::Coordinator;
use crate::error::{Error, ErrorKind, Result, Warning};
use crate::handle::{MailboxHandle, OpenMode};
use crate::identity::IdentityService;
use crate::namespace::{NamespaceResolver, NamespaceSet};

/// Default folder roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultFolder {
    /// Trash.
    Trash,
    /// Drafts.
    Drafts,
    /// Sent.
    Sent,
    /// Spam.
    Spam,
}

impl DefaultFolder {
    /// All roles.
    pub const ALL: [Self; 4] = [Self::Trash, Self::Drafts, Self::Sent, Self::Spam];

    /// Name used when nothing else is configured.
    #[must_use]
    pub const fn standard_name(self) -> &'static str {
        match self {
            Self::Trash => "Trash",
            Self::Drafts => "Drafts",
            Self::Sent => "Sent",
            Self::Spam => "Spam",
        }
    }

    /// Matching special-use attribute.
    #[must_use]
    pub const fn special_use(self) -> SpecialUse {
        match self {
            Self::Trash => SpecialUse::Trash,
            Self::Drafts => SpecialUse::Drafts,
            Self::Sent => SpecialUse::Sent,
            Self::Spam => SpecialUse::Junk,
        }
    }

    fn configured(self, ctx: &SessionContext) -> Option<&str> {
        let folders = &ctx.default_folders;
        match self {
            Self::Trash => folders.trash.as_deref(),
            Self::Drafts => folders.drafts.as_deref(),
            Self::Sent => folders.sent.as_deref(),
            Self::Spam => folders.spam.as_deref(),
        }
    }
}

/// Shared state of all sessions.
#[derive(Debug)]
pub struct Engine {
    props: ImapProperties,
    caches: CacheRegistry,
    coordinator: Coordinator,
    identities: Arc<dyn IdentityService>,
}

impl Engine {
    /// Creates an engine on the system clock.
    #[must_use]
    pub fn new(props: ImapProperties, identities: Arc<dyn IdentityService>) -> Arc<Self> {
        Self::with_clock(props, identities, Arc::new(SystemClock))
    }

    /// Creates an engine on the given clock.
    ///
    /// Zero block or fetch limits are raised to one.
    #[must_use]
    pub fn with_clock(
        props: ImapProperties,
        identities: Arc<dyn IdentityService>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let props = props.clamped();
        Arc::new(Self {
            caches: CacheRegistry::new(
                Arc::clone(&clock),
                props.folder_cache_timeout,
                props.support_subscription,
            ),
            coordinator: Coordinator::new(clock, props.fail_fast_cooldown),
            identities,
            props,
        })
    }

    /// Configuration.
    #[must_use]
    pub const fn properties(&self) -> &ImapProperties {
        &self.props
    }

    /// Cache registry.
    #[must_use]
    pub const fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// Concurrency coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Identity directory.
    #[must_use]
    pub fn identities(&self) -> &dyn IdentityService {
        self.identities.as_ref()
    }

    /// Binds an authenticated transport to a session.
    #[must_use]
    pub fn open_session<T: Transport>(
        self: &Arc<Self>,
        ctx: SessionContext,
        mut transport: T,
    ) -> MailSession<T> {
        let info = transport.server_info().clone();
        let quirks = ServerQuirks::detect(transport.capabilities(), info.greeting.as_deref(), &info.host);
        transport.set_read_timeout(self.props.read_timeout);
        let cache = self.caches.cache_for(&ctx.account, &ctx.session);
        info!(
            account = %ctx.account,
            session = %ctx.session,
            server = ?quirks.server_type,
            "session opened"
        );
        MailSession {
            engine: Arc::clone(self),
            ctx,
            transport,
            cache,
            namespaces: NamespaceResolver::new(),
            quirks,
            handle: MailboxHandle::new(),
            fetch_profile: FetchProfile::default(),
            warnings: Vec::new(),
            rights: HashMap::new(),
            pending_purges: Vec::new(),
        }
    }

    /// Drops every cache and mark of an account.
    pub fn drop_account(&self, account: &str) {
        self.caches.drop_account(account);
        self.coordinator.drop_account(account);
    }
}

/// One worker's view of a mail account.
#[derive(Debug)]
pub struct MailSession<T: Transport> {
    pub(crate) engine: Arc<Engine>,
    pub(crate) ctx: SessionContext,
    pub(crate) transport: T,
    pub(crate) cache: Arc<FolderCache>,
    pub(crate) namespaces: NamespaceResolver,
    pub(crate) quirks: ServerQuirks,
    pub(crate) handle: MailboxHandle,
    pub(crate) fetch_profile: FetchProfile,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) rights: HashMap<String, Rights>,
    pub(crate) pending_purges: Vec<String>,
}

impl<T: Transport> MailSession<T> {
    /// Session context.
    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Engine configuration.
    #[must_use]
    pub fn properties(&self) -> &ImapProperties {
        &self.engine.props
    }

    /// Detected server quirks.
    #[must_use]
    pub const fn quirks(&self) -> &ServerQuirks {
        &self.quirks
    }

    /// The underlying transport.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Fetch profile currently in use.
    #[must_use]
    pub const fn fetch_profile(&self) -> FetchProfile {
        self.fetch_profile
    }

    /// Name of the open mailbox.
    #[must_use]
    pub fn open_mailbox(&self) -> Option<&str> {
        self.handle.current()
    }

    /// Returns and clears collected warnings.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Names of renamed folders still waiting for deletion.
    #[must_use]
    pub fn pending_purges(&self) -> &[String] {
        &self.pending_purges
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    /// Short-circuits calls on a folder in its fail-fast window.
    pub(crate) fn check_fail_fast(&self, folder: &str) -> Result<()> {
        self.engine.coordinator.check(&self.ctx.account, folder)
    }

    /// Maps a transport error on `folder`, marking the folder fail-fast
    /// for broken connections and INUSE answers.
    pub(crate) fn fail(&self, folder: &str, err: mailkeeper_imap::Error) -> Error {
        if err.is_connection_error() || err.has_code(&ResponseCode::InUse) {
            self.engine.coordinator.mark_failed(&self.ctx.account, folder);
        }
        Error::from_transport(err, folder)
    }

    /// Marks `folder` fail-fast when an already mapped error calls for it.
    pub(crate) fn note(&self, folder: &str, err: Error) -> Error {
        if err.marks_fail_fast() {
            self.engine.coordinator.mark_failed(&self.ctx.account, folder);
        }
        err
    }

    /// Opens a mailbox through the session handle.
    pub(crate) async fn open_folder(&mut self, name: &str, mode: OpenMode) -> Result<MailboxStatus> {
        match self.handle.open(&mut self.transport, name, mode).await {
            Ok(status) => Ok(status),
            Err(err) => Err(self.note(name, err)),
        }
    }

    /// Leaves the open mailbox, if any.
    pub(crate) async fn release_folder(&mut self) -> Result<()> {
        let Some(name) = self.handle.current().map(str::to_string) else {
            return Ok(());
        };
        match self.handle.release(&mut self.transport).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.note(&name, err)),
        }
    }

    /// Leaves the open mailbox if it lies in the subtree of `root`.
    pub(crate) async fn release_subtree(&mut self, root: &str, separator: char) -> Result<()> {
        if self.handle.is_open_within(root, separator) {
            self.release_folder().await?;
        }
        Ok(())
    }

    /// Applies ACL changes, keeping per-entry failures as warnings.
    pub(crate) async fn apply_acl(&mut self, folder: &str, changes: &AclChanges) -> Result<()> {
        match acl::apply(&mut self.transport, folder, changes).await {
            Ok(warnings) => {
                self.warnings.extend(warnings);
                Ok(())
            }
            Err(err) => Err(self.note(folder, err)),
        }
    }

    /// Hierarchy separator.
    ///
    /// # Errors
    ///
    /// Propagates LIST failures.
    pub async fn separator(&mut self) -> Result<char> {
        self.cache.separator(&mut self.transport).await
    }

    /// Cached entry of a folder.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn folder(&mut self, full_name: &str) -> Result<Option<Arc<FolderEntry>>> {
        self.cache.get(&mut self.transport, full_name).await
    }

    /// Whether a folder exists. INBOX always does.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn exists(&mut self, full_name: &str) -> Result<bool> {
        self.cache.exists(&mut self.transport, full_name).await
    }

    /// Direct children, root level for `None`.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn children(
        &mut self,
        parent: Option<&str>,
        subscribed_only: bool,
    ) -> Result<Vec<Arc<FolderEntry>>> {
        let subscribed_only = subscribed_only && !self.ctx.ignore_subscription;
        self.cache
            .children(&mut self.transport, parent, subscribed_only)
            .await
    }

    /// Namespaces of the account.
    ///
    /// # Errors
    ///
    /// Propagates connection and LIST failures.
    pub async fn namespaces(&mut self) -> Result<NamespaceSet> {
        Ok(self
            .namespaces
            .namespaces(&mut self.transport, &self.cache)
            .await?
            .clone())
    }

    /// Prefix default folders live under.
    ///
    /// # Errors
    ///
    /// Propagates connection and LIST failures.
    pub async fn default_prefix(&mut self) -> Result<String> {
        let bracketed = self.quirks.bracketed_system_root;
        let root_allowed = self.engine.props.root_subfolders_allowed;
        self.namespaces
            .default_prefix(&mut self.transport, &self.cache, bracketed, root_allowed)
            .await
    }

    /// Full name of a default folder.
    ///
    /// Order: the configured name (as a full name, else under the default
    /// prefix), the special-use attribute, the standard name under the
    /// default prefix. The result may not exist yet.
    ///
    /// # Errors
    ///
    /// Propagates connection and LIST failures.
    pub async fn default_folder(&mut self, role: DefaultFolder) -> Result<String> {
        let prefix = self.default_prefix().await?;
        if let Some(configured) = role.configured(&self.ctx).map(str::to_string) {
            if self.exists(&configured).await? {
                return Ok(configured);
            }
            return Ok(format!("{prefix}{configured}"));
        }
        // Folders renamed away by trash-through-rename may still carry the
        // role on servers without METADATA.
        let retired = &self.pending_purges;
        let purge_root = self.engine.props.purge_folder.as_deref();
        let separator = self.cache.separator(&mut self.transport).await?;
        let keep = |name: &str| {
            !retired.iter().any(|r| r == name)
                && !purge_root.is_some_and(|root| is_in_subtree(name, root, separator))
        };
        if let Some(found) = self
            .cache
            .special_use_where(&mut self.transport, role.special_use(), keep)
            .await?
        {
            return Ok(found);
        }
        Ok(format!("{prefix}{}", role.standard_name()))
    }

    /// The trash folder, which must exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it doesn't.
    pub async fn trash_root(&mut self) -> Result<String> {
        let trash = self.default_folder(DefaultFolder::Trash).await?;
        if self.exists(&trash).await? {
            Ok(trash)
        } else {
            Err(Error::NotFound(trash))
        }
    }

    /// Whether `full_name` is INBOX or one of the default folders.
    ///
    /// # Errors
    ///
    /// Propagates connection and LIST failures.
    pub async fn is_default_folder(&mut self, full_name: &str) -> Result<bool> {
        let name = normalize(full_name);
        if name == INBOX {
            return Ok(true);
        }
        for role in DefaultFolder::ALL {
            if self.default_folder(role).await? == name {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `full_name` lies in the trash subtree.
    ///
    /// # Errors
    ///
    /// Propagates connection and LIST failures.
    pub async fn is_in_trash(&mut self, full_name: &str) -> Result<bool> {
        let trash = self.default_folder(DefaultFolder::Trash).await?;
        let separator = self.separator().await?;
        Ok(is_in_subtree(full_name, &trash, separator))
    }

    /// The user's rights on a folder, cached per session.
    ///
    /// Servers without ACL grant everything.
    ///
    /// # Errors
    ///
    /// Maps MYRIGHTS failures.
    pub async fn my_rights(&mut self, full_name: &str) -> Result<Rights> {
        if !self.transport.capabilities().supports_acl() {
            return Ok(Rights::all());
        }
        if let Some(rights) = self.rights.get(full_name) {
            return Ok(*rights);
        }
        let rights = match self.transport.my_rights(full_name).await {
            Ok(rights) => rights,
            Err(err) => return Err(self.fail(full_name, err)),
        };
        self.rights.insert(full_name.to_string(), rights);
        Ok(rights)
    }

    /// Fails with [`Error::Permission`] unless the user holds `needed`.
    pub(crate) async fn require_rights(&mut self, full_name: &str, needed: Rights, what: &str) -> Result<()> {
        let rights = self.my_rights(full_name).await?;
        if rights.contains(needed) {
            Ok(())
        } else {
            Err(Error::Permission {
                folder: full_name.to_string(),
                detail: format!("{what} requires rights \"{needed}\", have \"{rights}\""),
            })
        }
    }

    /// Drops every cache that a structural change may have made stale.
    pub(crate) fn invalidate_structure(&mut self) {
        self.engine.caches.invalidate_account(&self.ctx.account);
        self.rights.clear();
    }

    /// Deletes folders queued by trash-through-rename.
    ///
    /// Failures are logged and kept as warnings and the name leaves the
    /// queue. A broken connection stops the run with the failed name and
    /// everything after it still queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the connection breaks.
    pub async fn run_deferred(&mut self) -> Result<usize> {
        let mut pending = std::mem::take(&mut self.pending_purges).into_iter();
        let mut purged = 0;
        while let Some(name) = pending.next() {
            match self.delete_subtree(&name).await {
                Ok(()) => {
                    debug!(folder = %name, "renamed trash purged");
                    purged += 1;
                }
                Err(err) if err.kind() == ErrorKind::Connection => {
                    self.pending_purges.push(name);
                    self.pending_purges.extend(pending);
                    warn!(
                        pending = self.pending_purges.len(),
                        error = %err,
                        "purging renamed trash interrupted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    warn!(folder = %name, error = %err, "purging renamed trash failed");
                    self.warn(Warning::CleanupFailed {
                        folder: name,
                        detail: err.to_string(),
                    });
                }
            }
        }
        Ok(purged)
    }

    /// Runs deferred work, leaves the open mailbox and tears the session
    /// down.
    ///
    /// # Errors
    ///
    /// Returns the first failure; teardown happens regardless.
    pub async fn close(mut self) -> Result<()> {
        let purged = self.run_deferred().await;
        let released = self.release_folder().await;
        info!(account = %self.ctx.account, session = %self.ctx.session, "session closed");
        purged?;
        released
    }
}

impl<T: Transport> Drop for MailSession<T> {
    fn drop(&mut self) {
        if !self.pending_purges.is_empty() {
            warn!(
                account = %self.ctx.account,
                pending = self.pending_purges.len(),
                "session dropped with renamed trash folders left"
            );
        }
        self.engine
            .caches
            .drop_session(&self.ctx.account, &self.ctx.session);
    }
}
