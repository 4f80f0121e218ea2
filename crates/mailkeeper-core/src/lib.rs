//! # mailkeeper-core
//!
//! Mailbox orchestration on top of an IMAP [`Transport`].
//!
//! This crate provides:
//! - **Folder metadata cache** - per (account, session) snapshots of the
//!   folder tree, replaced atomically and invalidated on structural change
//! - **Namespace resolution** - personal, other-users and shared roots,
//!   longest-prefix classification and the default folder prefix
//! - **ACL reconciliation** - diffing old and new access lists by identity
//!   with the guarantee that someone can still administer the folder
//! - **Folder lifecycle** - create, rename, move, delete, trash, clear
//! - **Message pipeline** - search and sort with fallbacks, fetch profile
//!   degradation, blockwise copy/move/delete, flags and append
//! - **Concurrency coordination** - operation collision detection, folder
//!   locks and fail-fast marks
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailkeeper_core::{Engine, ImapProperties, SessionContext, StaticDirectory};
//!
//! let engine = Engine::new(ImapProperties::default(), Arc::new(StaticDirectory::new()));
//! let mut session = engine.open_session(SessionContext::new("acc-1", "s-1", "alice"), transport);
//! let name = session.create_folder(None, "Projects", Default::default()).await?;
//! session.trash_folder(&name).await?;
//! session.close().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod acl;
pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
mod error;
pub mod folder;
pub mod handle;
pub mod identity;
pub mod message;
pub mod namespace;
pub mod session;

pub use mailkeeper_imap::Transport;

pub use acl::AclChanges;
pub use cache::{CacheRegistry, FolderCache, FolderEntry, Snapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DefaultFolders, ImapProperties, ImapPropertiesBuilder, SessionContext};
pub use coordinator::{Coordinator, OperationKey, OperationType};
pub use error::{Error, ErrorKind, Result, Warning};
pub use folder::{CreateOptions, FolderUpdate};
pub use handle::{MailboxHandle, OpenMode};
pub use identity::{Entity, IdentityError, IdentityService, StaticDirectory};
pub use message::{AppendMessage, SearchQuery, SortOrder};
pub use namespace::{Namespace, NamespaceCategory, NamespaceResolver, NamespaceSet};
pub use session::{DefaultFolder, Engine, MailSession};
