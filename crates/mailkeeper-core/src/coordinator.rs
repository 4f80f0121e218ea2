//! Concurrency control.
//!
//! Three mechanisms, all keyed by account and folder:
//!
//! - **operation markers**: a message operation registers an
//!   [`OperationKey`]; a second operation of the same type touching any of
//!   the same folders is rejected at once with [`Error::ConcurrentUse`];
//! - **folder locks**: structural folder operations hold a
//!   `tokio::sync::Mutex` per folder for their whole multi-step run;
//! - **fail-fast marks**: a folder whose connection broke short-circuits
//!   new calls with [`Error::FailFast`] until the cooldown elapses.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};

/// Kind of message operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Deleting messages.
    MsgDelete,
    /// Copying or moving messages.
    MsgCopy,
    /// Appending messages.
    MsgAppend,
    /// Changing system flags.
    MsgFlagsUpdate,
    /// Changing keywords.
    MsgUserFlagsUpdate,
}

/// Token for one running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationKey {
    op: OperationType,
    account: String,
    folders: BTreeSet<String>,
}

impl OperationKey {
    /// Creates a key scoped to one or more folders.
    #[must_use]
    pub fn new<I, S>(op: OperationType, account: impl Into<String>, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op,
            account: account.into(),
            folders: folders.into_iter().map(Into::into).collect(),
        }
    }

    /// Operation type.
    #[must_use]
    pub const fn op(&self) -> OperationType {
        self.op
    }

    /// Whether the two keys would run into each other.
    #[must_use]
    pub fn collides(&self, other: &Self) -> bool {
        self.op == other.op
            && self.account == other.account
            && !self.folders.is_disjoint(&other.folders)
    }

    fn describe(&self) -> String {
        self.folders.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

type ActiveMap = Arc<Mutex<HashMap<u64, OperationKey>>>;

/// Releases its operation marker on drop.
#[derive(Debug)]
pub struct OperationGuard {
    id: u64,
    active: ActiveMap,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Holds folder locks until dropped.
#[derive(Debug)]
pub struct FolderLockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

/// Shared concurrency state of an engine.
#[derive(Debug)]
pub struct Coordinator {
    next_id: AtomicU64,
    active: ActiveMap,
    locks: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
    failed: Mutex<HashMap<(String, String), Instant>>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl Coordinator {
    /// Creates a coordinator with the given fail-fast cooldown.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: Arc::new(Mutex::new(HashMap::new())),
            locks: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashMap::new()),
            clock,
            cooldown,
        }
    }

    /// Registers an operation; never waits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConcurrentUse`] if a colliding operation is running.
    pub fn begin(&self, key: OperationKey) -> Result<OperationGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = active.values().find(|k| k.collides(&key)) {
            debug!(op = ?key.op, folders = %running.describe(), "operation rejected, mailbox in use");
            return Err(Error::ConcurrentUse(key.describe()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        active.insert(id, key);
        Ok(OperationGuard {
            id,
            active: Arc::clone(&self.active),
        })
    }

    /// Number of running operations.
    #[must_use]
    pub fn active_operations(&self) -> usize {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Locks folders for a structural operation, waiting for holders.
    ///
    /// Locks are taken in name order so overlapping requests can't
    /// deadlock.
    pub async fn lock_folders(&self, account: &str, folders: &[&str]) -> FolderLockGuard {
        let names: BTreeSet<&str> = folders.iter().copied().collect();
        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            names
                .iter()
                .map(|name| {
                    Arc::clone(
                        locks
                            .entry((account.to_string(), (*name).to_string()))
                            .or_default(),
                    )
                })
                .collect()
        };
        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        FolderLockGuard { _guards: guards }
    }

    /// Forgets locks nobody holds or waits for.
    pub fn prune_locks(&self) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, m| Arc::strong_count(m) > 1);
    }

    /// Marks a folder as failed.
    pub fn mark_failed(&self, account: &str, folder: &str) {
        warn!(account, folder, cooldown = ?self.cooldown, "marking folder fail-fast");
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((account.to_string(), folder.to_string()), self.clock.now());
    }

    /// Checks the fail-fast mark of a folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FailFast`] while the cooldown runs.
    pub fn check(&self, account: &str, folder: &str) -> Result<()> {
        let key = (account.to_string(), folder.to_string());
        let mut failed = self.failed.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(since) = failed.get(&key).copied() else {
            return Ok(());
        };
        let elapsed = self.clock.elapsed(since);
        if elapsed < self.cooldown {
            return Err(Error::FailFast {
                folder: folder.to_string(),
                remaining: self.cooldown.saturating_sub(elapsed),
            });
        }
        failed.remove(&key);
        Ok(())
    }

    /// Clears the fail-fast mark of a folder.
    pub fn clear_failed(&self, account: &str, folder: &str) {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(account.to_string(), folder.to_string()));
    }

    /// Drops all state of an account.
    pub fn drop_account(&self, account: &str) {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(acc, _), _| acc != account);
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(acc, _), m| acc != account || Arc::strong_count(m) > 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn coordinator(clock: Arc<ManualClock>) -> Coordinator {
        Coordinator::new(clock, Duration::from_secs(10))
    }

    mod marker_tests {
        use super::*;

        #[test]
        fn same_folder_same_type_collides() {
            let c = coordinator(Arc::new(ManualClock::new()));
            let _first = c
                .begin(OperationKey::new(OperationType::MsgDelete, "acc", ["INBOX"]))
                .unwrap();
            let second = c.begin(OperationKey::new(OperationType::MsgDelete, "acc", ["INBOX"]));
            assert!(matches!(second, Err(Error::ConcurrentUse(_))));
        }

        #[test]
        fn different_type_account_or_folder_pass() {
            let c = coordinator(Arc::new(ManualClock::new()));
            let _a = c
                .begin(OperationKey::new(OperationType::MsgDelete, "acc", ["INBOX"]))
                .unwrap();
            let _b = c
                .begin(OperationKey::new(OperationType::MsgCopy, "acc", ["INBOX"]))
                .unwrap();
            let _c = c
                .begin(OperationKey::new(OperationType::MsgDelete, "other", ["INBOX"]))
                .unwrap();
            let _d = c
                .begin(OperationKey::new(OperationType::MsgDelete, "acc", ["Sent"]))
                .unwrap();
            assert_eq!(c.active_operations(), 4);
        }

        #[test]
        fn shared_destination_collides() {
            let c = coordinator(Arc::new(ManualClock::new()));
            let _a = c
                .begin(OperationKey::new(OperationType::MsgCopy, "acc", ["INBOX", "Archive"]))
                .unwrap();
            assert!(c
                .begin(OperationKey::new(OperationType::MsgCopy, "acc", ["Sent", "Archive"]))
                .is_err());
        }

        #[test]
        fn guard_releases_on_drop() {
            let c = coordinator(Arc::new(ManualClock::new()));
            let key = OperationKey::new(OperationType::MsgAppend, "acc", ["INBOX"]);
            drop(c.begin(key.clone()).unwrap());
            assert_eq!(c.active_operations(), 0);
            assert!(c.begin(key).is_ok());
        }
    }

    mod lock_tests {
        use super::*;

        #[tokio::test]
        async fn second_locker_waits() {
            let c = Arc::new(coordinator(Arc::new(ManualClock::new())));
            let held = c.lock_folders("acc", &["A", "B"]).await;

            let waiter = {
                let c = Arc::clone(&c);
                tokio::spawn(async move {
                    let _g = c.lock_folders("acc", &["B"]).await;
                })
            };
            tokio::task::yield_now().await;
            assert!(!waiter.is_finished());

            drop(held);
            waiter.await.unwrap();
        }

        #[test]
        fn waiter_woken_on_release() {
            let c = coordinator(Arc::new(ManualClock::new()));
            let held = tokio_test::block_on(c.lock_folders("acc", &["A"]));

            let mut other_account = tokio_test::task::spawn(c.lock_folders("other", &["A"]));
            tokio_test::assert_ready!(other_account.poll());

            let mut waiter = tokio_test::task::spawn(c.lock_folders("acc", &["A"]));
            tokio_test::assert_pending!(waiter.poll());
            drop(held);
            assert!(waiter.is_woken());
            tokio_test::assert_ready!(waiter.poll());
        }

        #[tokio::test]
        async fn prune_keeps_held_locks() {
            let c = coordinator(Arc::new(ManualClock::new()));
            let held = c.lock_folders("acc", &["A"]).await;
            drop(c.lock_folders("acc", &["B"]).await);
            c.prune_locks();
            assert_eq!(c.locks.lock().unwrap().len(), 1);
            drop(held);
        }
    }

    mod fail_fast_tests {
        use super::*;

        #[test]
        fn cooldown_window() {
            let clock = Arc::new(ManualClock::new());
            let c = coordinator(Arc::clone(&clock));
            c.mark_failed("acc", "INBOX");

            let err = c.check("acc", "INBOX").unwrap_err();
            assert!(matches!(err, Error::FailFast { remaining, .. } if remaining == Duration::from_secs(10)));
            assert!(c.check("acc", "Sent").is_ok());

            clock.advance(Duration::from_secs(10));
            assert!(c.check("acc", "INBOX").is_ok());
        }

        #[test]
        fn clear_resets() {
            let c = coordinator(Arc::new(ManualClock::new()));
            c.mark_failed("acc", "INBOX");
            c.clear_failed("acc", "INBOX");
            assert!(c.check("acc", "INBOX").is_ok());
        }
    }
}
