//! Folder metadata cache.
//!
//! One [`FolderCache`] per (account, session) holds the folder tree as an
//! immutable [`Snapshot`] behind an `ArcSwapOption`. Readers load the
//! current snapshot without locking; a refresh builds a complete new
//! snapshot from LIST/LSUB and publishes it in one swap, so nobody ever
//! sees a half-built tree.
//!
//! Invalidation bumps a generation counter. A load that started before an
//! invalidation still answers its own caller but is not published, which
//! keeps the last invalidation authoritative.
//!
//! INBOX always exists, whatever the server listed.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use mailkeeper_imap::{ListEntry, SpecialUse, Transport};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Result, TransportResultExt};

/// Name of the one folder every account has.
pub const INBOX: &str = "INBOX";

/// Folds any case of `INBOX` onto the canonical spelling.
#[must_use]
pub fn normalize(name: &str) -> String {
    if name.eq_ignore_ascii_case(INBOX) {
        INBOX.to_string()
    } else {
        name.to_string()
    }
}

/// Cached LIST/LSUB facts about one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    full_name: String,
    separator: char,
    exists: bool,
    selectable: bool,
    has_inferiors: bool,
    subscribed: bool,
    special_use: Option<SpecialUse>,
    parent: Option<String>,
    children: BTreeSet<String>,
}

impl FolderEntry {
    fn listed(entry: &ListEntry, separator: char) -> Self {
        let full_name = normalize(&entry.name);
        Self {
            parent: parent_of(&full_name, separator),
            exists: !entry.is_nonexistent(),
            selectable: entry.is_selectable(),
            has_inferiors: entry.has_inferiors(),
            subscribed: false,
            special_use: entry.special_use(),
            separator,
            children: BTreeSet::new(),
            full_name,
        }
    }

    fn placeholder(full_name: &str, separator: char) -> Self {
        Self {
            full_name: full_name.to_string(),
            separator,
            exists: false,
            selectable: false,
            has_inferiors: true,
            subscribed: false,
            special_use: None,
            parent: parent_of(full_name, separator),
            children: BTreeSet::new(),
        }
    }

    /// Full hierarchical name.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Last path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit(self.separator)
            .next()
            .unwrap_or(&self.full_name)
    }

    /// Hierarchy separator.
    #[must_use]
    pub const fn separator(&self) -> char {
        self.separator
    }

    /// False for synthetic placeholders of unlisted path levels.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists || self.full_name == INBOX
    }

    /// Whether the folder can be opened.
    #[must_use]
    pub const fn is_selectable(&self) -> bool {
        self.selectable
    }

    /// Whether the folder may hold subfolders.
    #[must_use]
    pub const fn has_inferiors(&self) -> bool {
        self.has_inferiors
    }

    /// Whether the folder is subscribed.
    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Special-use role, if any.
    #[must_use]
    pub const fn special_use(&self) -> Option<SpecialUse> {
        self.special_use
    }

    /// Full name of the parent, `None` at root level.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Full names of the direct children, ordered.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    /// Whether any children are known.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Returns the parent full name of `name`.
#[must_use]
pub fn parent_of(name: &str, separator: char) -> Option<String> {
    name.trim_end_matches(separator)
        .rfind(separator)
        .map(|i| name[..i].to_string())
        .filter(|p| !p.is_empty())
}

/// Returns true if `name` equals `root` or lies below it.
#[must_use]
pub fn is_in_subtree(name: &str, root: &str, separator: char) -> bool {
    name == root
        || name
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with(separator))
}

/// An immutable view of the folder tree.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: HashMap<String, Arc<FolderEntry>>,
    roots: BTreeSet<String>,
    stale: HashSet<String>,
    separator: char,
    loaded_at: Instant,
}

impl Snapshot {
    fn build(
        listed: &[ListEntry],
        subscribed: &[ListEntry],
        separator: char,
        track_subscriptions: bool,
        loaded_at: Instant,
    ) -> Self {
        let subscribed_names: HashSet<String> =
            subscribed.iter().map(|e| normalize(&e.name)).collect();

        let mut entries: HashMap<String, FolderEntry> = HashMap::new();
        for entry in listed.iter().filter(|e| !e.name.is_empty()) {
            let folder = FolderEntry::listed(entry, separator);
            entries.insert(folder.full_name.clone(), folder);
        }
        for name in &subscribed_names {
            entries
                .entry(name.clone())
                .or_insert_with(|| FolderEntry::placeholder(name, separator));
        }
        entries
            .entry(INBOX.to_string())
            .or_insert_with(|| FolderEntry {
                exists: true,
                selectable: true,
                has_inferiors: true,
                ..FolderEntry::placeholder(INBOX, separator)
            });

        for folder in entries.values_mut() {
            folder.subscribed = !track_subscriptions || subscribed_names.contains(&folder.full_name);
        }

        let mut pending: VecDeque<String> = entries.keys().cloned().collect();
        let mut roots = BTreeSet::new();
        while let Some(name) = pending.pop_front() {
            let parent = entries.get(&name).and_then(|f| f.parent.clone());
            match parent {
                None => {
                    roots.insert(name);
                }
                Some(parent) => {
                    if !entries.contains_key(&parent) {
                        entries.insert(parent.clone(), FolderEntry::placeholder(&parent, separator));
                        pending.push_back(parent.clone());
                    }
                    if let Some(p) = entries.get_mut(&parent) {
                        p.children.insert(name);
                    }
                }
            }
        }

        Self {
            entries: entries.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            roots,
            stale: HashSet::new(),
            separator,
            loaded_at,
        }
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<Arc<FolderEntry>> {
        self.entries.get(&normalize(full_name)).cloned()
    }

    /// Hierarchy separator.
    #[must_use]
    pub const fn separator(&self) -> char {
        self.separator
    }

    /// Number of entries, placeholders included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct children of `parent`, or the root level for `None`.
    #[must_use]
    pub fn children(&self, parent: Option<&str>) -> Vec<Arc<FolderEntry>> {
        let names: Vec<&String> = match parent {
            None => self.roots.iter().collect(),
            Some(p) => self
                .entries
                .get(&normalize(p))
                .map(|e| e.children.iter().collect())
                .unwrap_or_default(),
        };
        names
            .into_iter()
            .filter_map(|n| self.entries.get(n).cloned())
            .collect()
    }

    /// The folder and all its descendants, parents before children.
    #[must_use]
    pub fn subtree(&self, root: &str) -> Vec<Arc<FolderEntry>> {
        let mut out = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::from([normalize(root)]);
        while let Some(name) = queue.pop_front() {
            if let Some(entry) = self.entries.get(&name) {
                queue.extend(entry.children.iter().cloned());
                out.push(Arc::clone(entry));
            }
        }
        out
    }

    /// First folder carrying a special-use role.
    #[must_use]
    pub fn special_use(&self, role: SpecialUse) -> Option<String> {
        self.special_use_where(role, |_| true)
    }

    /// First folder carrying a special-use role that `keep` accepts.
    #[must_use]
    pub fn special_use_where(&self, role: SpecialUse, keep: impl Fn(&str) -> bool) -> Option<String> {
        let mut matches: Vec<&Arc<FolderEntry>> = self
            .entries
            .values()
            .filter(|e| e.exists() && e.special_use == Some(role) && keep(&e.full_name))
            .collect();
        matches.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        matches.first().map(|e| e.full_name.clone())
    }

    /// Whether any descendant of `full_name` is subscribed.
    #[must_use]
    pub fn has_any_subscribed_subfolder(&self, full_name: &str) -> bool {
        self.subtree(full_name)
            .iter()
            .skip(1)
            .any(|e| e.subscribed)
    }

    fn with_refreshed(&self, name: &str, listed: &[ListEntry], subscribed: bool, track: bool) -> Self {
        let mut next = self.clone();
        next.stale.remove(name);
        match listed.iter().find(|e| normalize(&e.name) == name) {
            Some(entry) => {
                let mut folder = FolderEntry::listed(entry, self.separator);
                folder.subscribed = !track || subscribed;
                if let Some(old) = self.entries.get(name) {
                    folder.children.clone_from(&old.children);
                }
                next.link(&folder);
                next.entries.insert(name.to_string(), Arc::new(folder));
            }
            None if name == INBOX => {}
            None => {
                let keep_placeholder = self.entries.get(name).is_some_and(|e| e.has_children());
                if keep_placeholder {
                    let mut folder = FolderEntry::placeholder(name, self.separator);
                    if let Some(old) = self.entries.get(name) {
                        folder.children.clone_from(&old.children);
                    }
                    next.entries.insert(name.to_string(), Arc::new(folder));
                } else {
                    next.unlink(name);
                    next.entries.remove(name);
                }
            }
        }
        next
    }

    fn link(&mut self, folder: &FolderEntry) {
        match &folder.parent {
            None => {
                self.roots.insert(folder.full_name.clone());
            }
            Some(parent) => {
                let mut p = self
                    .entries
                    .get(parent)
                    .map_or_else(|| FolderEntry::placeholder(parent, self.separator), |e| (**e).clone());
                p.children.insert(folder.full_name.clone());
                let p = Arc::new(p);
                self.entries.insert(parent.clone(), Arc::clone(&p));
                if p.parent.is_none() {
                    self.roots.insert(parent.clone());
                }
            }
        }
    }

    fn unlink(&mut self, name: &str) {
        self.roots.remove(name);
        if let Some(parent) = parent_of(name, self.separator) {
            if let Some(p) = self.entries.get(&parent) {
                let mut p = (**p).clone();
                p.children.remove(name);
                self.entries.insert(parent, Arc::new(p));
            }
        }
    }
}

/// Lock-free folder cache for one (account, session).
#[derive(Debug)]
pub struct FolderCache {
    current: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    track_subscriptions: bool,
}

impl FolderCache {
    /// Creates an empty cache.
    ///
    /// With `track_subscriptions` off every folder reports subscribed.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration, track_subscriptions: bool) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            clock,
            timeout,
            track_subscriptions,
        }
    }

    /// Returns a fresh snapshot, loading the tree when needed.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn snapshot<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.current.load_full() {
            if self.clock.elapsed(snapshot.loaded_at) < self.timeout {
                return Ok(snapshot);
            }
            debug!(age = ?self.clock.elapsed(snapshot.loaded_at), "folder cache expired");
        }
        self.load(transport).await
    }

    async fn load<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<Arc<Snapshot>> {
        let generation = self.generation.load(Ordering::SeqCst);
        let listed = transport.list("", "*").await.on_folder("")?;
        let separator = match listed.iter().find_map(|e| e.delimiter) {
            Some(sep) => sep,
            None => transport
                .list("", "")
                .await
                .on_folder("")?
                .iter()
                .find_map(|e| e.delimiter)
                .unwrap_or('/'),
        };
        let subscribed = if self.track_subscriptions {
            transport.lsub("", "*").await.on_folder("")?
        } else {
            Vec::new()
        };

        let snapshot = Arc::new(Snapshot::build(
            &listed,
            &subscribed,
            separator,
            self.track_subscriptions,
            self.clock.now(),
        ));
        debug!(entries = snapshot.len(), %separator, "folder cache loaded");
        self.publish(generation, &snapshot);
        Ok(snapshot)
    }

    /// Stores `snapshot` unless an invalidation happened since `generation`
    /// was read. The check runs inside the swap so an invalidation landing
    /// between check and store forces a retry.
    fn publish(&self, generation: u64, snapshot: &Arc<Snapshot>) {
        let mut published = false;
        self.current.rcu(|current| {
            published = self.generation.load(Ordering::SeqCst) == generation;
            if published { Some(Arc::clone(snapshot)) } else { current.clone() }
        });
        if !published {
            debug!("folder cache load raced an invalidation, not published");
        }
    }

    /// Returns the entry for `full_name`, or `None` if the server doesn't
    /// know it.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn get<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        full_name: &str,
    ) -> Result<Option<Arc<FolderEntry>>> {
        let name = normalize(full_name);
        let generation = self.generation.load(Ordering::SeqCst);
        let snapshot = self.snapshot(transport).await?;
        if !snapshot.stale.contains(&name) {
            return Ok(snapshot.get(&name));
        }

        let listed = transport.list("", &name).await.on_folder(&name)?;
        let subscribed = if self.track_subscriptions {
            !transport.lsub("", &name).await.on_folder(&name)?.is_empty()
        } else {
            true
        };
        let refreshed = Arc::new(snapshot.with_refreshed(&name, &listed, subscribed, self.track_subscriptions));
        debug!(folder = %name, "folder cache entry refreshed");
        self.publish(generation, &refreshed);
        Ok(refreshed.get(&name))
    }

    /// Returns true if the folder exists. INBOX always exists.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn exists<T: Transport + ?Sized>(&self, transport: &mut T, full_name: &str) -> Result<bool> {
        if normalize(full_name) == INBOX {
            return Ok(true);
        }
        Ok(self.get(transport, full_name).await?.is_some_and(|e| e.exists()))
    }

    /// Hierarchy separator.
    ///
    /// # Errors
    ///
    /// Propagates LIST failures.
    pub async fn separator<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<char> {
        Ok(self.snapshot(transport).await?.separator)
    }

    /// Direct children of `parent` (root level for `None`), optionally only
    /// subscribed ones or ones with subscribed descendants.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn children<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        parent: Option<&str>,
        subscribed_only: bool,
    ) -> Result<Vec<Arc<FolderEntry>>> {
        let snapshot = self.snapshot(transport).await?;
        Ok(snapshot
            .children(parent)
            .into_iter()
            .filter(|e| {
                !subscribed_only
                    || e.subscribed
                    || snapshot.has_any_subscribed_subfolder(&e.full_name)
            })
            .collect())
    }

    /// Full name of the folder carrying `role`.
    ///
    /// # Errors
    ///
    /// Propagates LIST failures.
    pub async fn special_use<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        role: SpecialUse,
    ) -> Result<Option<String>> {
        Ok(self.snapshot(transport).await?.special_use(role))
    }

    /// Full name of the folder carrying `role`, skipping names `keep`
    /// rejects.
    ///
    /// # Errors
    ///
    /// Propagates LIST failures.
    pub async fn special_use_where<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        role: SpecialUse,
        keep: impl Fn(&str) -> bool + Send,
    ) -> Result<Option<String>> {
        Ok(self.snapshot(transport).await?.special_use_where(role, keep))
    }

    /// Whether any descendant of `full_name` is subscribed.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn has_any_subscribed_subfolder<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        full_name: &str,
    ) -> Result<bool> {
        Ok(self
            .snapshot(transport)
            .await?
            .has_any_subscribed_subfolder(full_name))
    }

    /// The folder and its descendants, parents first.
    ///
    /// # Errors
    ///
    /// Propagates LIST/LSUB failures.
    pub async fn subtree<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        full_name: &str,
    ) -> Result<Vec<Arc<FolderEntry>>> {
        Ok(self.snapshot(transport).await?.subtree(full_name))
    }

    /// Marks one entry stale; the next [`get`](Self::get) re-LISTs it.
    pub fn invalidate(&self, full_name: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let name = normalize(full_name);
        self.current.rcu(|current| {
            current.as_ref().map(|snapshot| {
                let mut next = Snapshot::clone(snapshot);
                next.stale.insert(name.clone());
                Arc::new(next)
            })
        });
    }

    /// Drops the whole snapshot.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.current.store(None);
    }

    /// Whether a snapshot is currently published.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }
}

/// Caches keyed by (account, session), with explicit teardown.
#[derive(Debug)]
pub struct CacheRegistry {
    caches: Mutex<HashMap<(String, String), Arc<FolderCache>>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    track_subscriptions: bool,
}

impl CacheRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, timeout: Duration, track_subscriptions: bool) -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
            clock,
            timeout,
            track_subscriptions,
        }
    }

    /// Returns the cache of a session, creating it on first use.
    #[must_use]
    pub fn cache_for(&self, account: &str, session: &str) -> Arc<FolderCache> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            caches
                .entry((account.to_string(), session.to_string()))
                .or_insert_with(|| {
                    Arc::new(FolderCache::new(
                        Arc::clone(&self.clock),
                        self.timeout,
                        self.track_subscriptions,
                    ))
                }),
        )
    }

    /// Invalidates every session cache of an account.
    pub fn invalidate_account(&self, account: &str) {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        for ((acc, _), cache) in caches.iter() {
            if acc == account {
                cache.invalidate_all();
            }
        }
    }

    /// Removes the cache of one session.
    pub fn drop_session(&self, account: &str, session: &str) {
        self.caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(account.to_string(), session.to_string()));
    }

    /// Removes every cache of an account.
    pub fn drop_account(&self, account: &str) {
        self.caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(acc, _), _| acc != account);
    }

    /// Number of live session caches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no caches are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
