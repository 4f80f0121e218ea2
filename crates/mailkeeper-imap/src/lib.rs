//! # mailkeeper-imap
//!
//! IMAP protocol types and the [`Transport`] seam used by the mailkeeper
//! engine.
//!
//! The engine never speaks the wire protocol itself. It drives an
//! authenticated connection through [`Transport`], which exposes one
//! method per IMAP command (LIST, SELECT, UID MOVE, GETACL, ...) and
//! returns typed results. Errors carry the server's response code so the
//! engine can tell `ALREADYEXISTS` from `NOPERM` from `OVERQUOTA`.
//!
//! ## Modules
//!
//! - [`types`]: capabilities, flags, UIDs, mailbox listings, ACL rights,
//!   namespaces, quota resources and search/sort parameters
//! - [`transport`]: the [`Transport`] trait
//! - [`quirks`]: server detection and per-server workarounds
//! - `mock` (feature `mock`): an in-memory server implementing
//!   [`Transport`] for tests
//!
//! ## Example
//!
//! ```ignore
//! use mailkeeper_imap::{Transport, UidSet};
//!
//! async fn archive_all<T: Transport>(t: &mut T) -> mailkeeper_imap::Result<()> {
//!     t.select("INBOX").await?;
//!     t.uid_move(&UidSet::All, "Archive").await?;
//!     t.close().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod quirks;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use quirks::{ServerQuirks, ServerType};
pub use transport::{ServerInfo, Transport};
pub use types::{
    AclEntry, AppendUid, Capabilities, Capability, CopyUid, FetchProfile, FetchedMessage, Flag,
    Flags, ListEntry, MailboxAttribute, MailboxStatus, NamespaceDescriptor, Namespaces,
    QuotaResource, QuotaResourceName, ResponseCode, Rights, SearchCriteria, SortCriterion, SortKey,
    SortVariant, SpecialUse, StoreAction, Uid, UidSet, UidValidity,
};
