//! Core IMAP types.
//!
//! The value types exchanged across the transport boundary, following
//! RFC 9051 (`IMAP4rev2`), RFC 3501 (`IMAP4rev1`) and the extensions the
//! engine relies on (ACL, NAMESPACE, UIDPLUS, MOVE, SORT, SPECIAL-USE,
//! QUOTA).

#![allow(clippy::missing_const_for_fn)]

mod acl;
mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod message;
mod namespace;
mod quota;
mod response_code;
mod sequence;

pub use acl::{AclEntry, Rights};
pub use capability::{Capabilities, Capability};
pub use flags::{Flag, Flags};
pub use identifiers::{Uid, UidValidity};
pub use mailbox::{ListEntry, MailboxAttribute, MailboxStatus, SpecialUse};
pub use message::{
    FetchProfile, FetchedMessage, SearchCriteria, SortCriterion, SortKey, SortVariant, StoreAction,
};
pub use namespace::{NamespaceDescriptor, Namespaces};
pub use quota::{QuotaResource, QuotaResourceName};
pub use response_code::{AppendUid, CopyUid, ResponseCode};
pub use sequence::UidSet;
