//! The transport seam.
//!
//! A [`Transport`] issues single IMAP commands against one authenticated
//! connection and returns parsed results. It keeps no mailbox model of
//! its own beyond the currently selected mailbox; everything above that
//! lives in the engine.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    AclEntry, AppendUid, Capabilities, CopyUid, FetchProfile, FetchedMessage, Flags, ListEntry,
    MailboxStatus, Namespaces, QuotaResource, Rights, SearchCriteria, SortCriterion, SortVariant,
    SpecialUse, StoreAction, Uid, UidSet,
};

/// Identification of the server behind a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Host name the connection was opened to.
    pub host: String,
    /// Greeting text, if the transport kept it.
    pub greeting: Option<String>,
}

/// One authenticated IMAP connection.
///
/// Selected-state commands (`uid_*`, `expunge`) act on the mailbox opened
/// by the last successful [`select`](Self::select) or
/// [`examine`](Self::examine).
///
/// Every method distinguishes "the server refused this command" from
/// "the connection is gone" through [`Error`](crate::Error).
#[async_trait]
pub trait Transport: Send {
    /// Capabilities advertised after authentication.
    fn capabilities(&self) -> &Capabilities;

    /// Server identification.
    fn server_info(&self) -> &ServerInfo;

    /// Overrides the read timeout for subsequent commands; `None` restores
    /// the default.
    fn set_read_timeout(&mut self, timeout: Option<Duration>);

    /// `LIST reference pattern`.
    async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>>;

    /// `LSUB reference pattern`.
    async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>>;

    /// `NAMESPACE`.
    async fn namespace(&mut self) -> Result<Namespaces>;

    /// `SELECT mailbox`.
    async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus>;

    /// `EXAMINE mailbox`.
    async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus>;

    /// `CLOSE`: expunges a read-write mailbox and leaves selected state.
    async fn close(&mut self) -> Result<()>;

    /// `UNSELECT`: leaves selected state without expunging.
    async fn unselect(&mut self) -> Result<()>;

    /// `UID SEARCH criteria`.
    async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>>;

    /// `UID SORT (keys) UTF-8 criteria`.
    async fn uid_sort(
        &mut self,
        sort: &[SortCriterion],
        criteria: &SearchCriteria,
        variant: SortVariant,
    ) -> Result<Vec<Uid>>;

    /// `UID FETCH uids items` with the items of `profile`.
    async fn uid_fetch(&mut self, uids: &UidSet, profile: FetchProfile) -> Result<Vec<FetchedMessage>>;

    /// `UID COPY uids mailbox`; COPYUID data when the server sent it.
    async fn uid_copy(&mut self, uids: &UidSet, mailbox: &str) -> Result<Option<CopyUid>>;

    /// `UID MOVE uids mailbox`; COPYUID data when the server sent it.
    async fn uid_move(&mut self, uids: &UidSet, mailbox: &str) -> Result<Option<CopyUid>>;

    /// `UID STORE uids (+|-)FLAGS.SILENT flags`.
    async fn uid_store(&mut self, uids: &UidSet, action: StoreAction, flags: &Flags) -> Result<()>;

    /// `EXPUNGE`.
    async fn expunge(&mut self) -> Result<()>;

    /// `UID EXPUNGE uids` (UIDPLUS).
    async fn uid_expunge(&mut self, uids: &UidSet) -> Result<()>;

    /// `APPEND mailbox flags message`; APPENDUID data when the server sent it.
    async fn append(&mut self, mailbox: &str, flags: &Flags, message: &[u8]) -> Result<Option<AppendUid>>;

    /// `CREATE mailbox`, with `(USE (...))` when a special use is given.
    async fn create(&mut self, mailbox: &str, special_use: Option<SpecialUse>) -> Result<()>;

    /// `DELETE mailbox`.
    async fn delete(&mut self, mailbox: &str) -> Result<()>;

    /// `RENAME from to`.
    async fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    /// `SUBSCRIBE mailbox`.
    async fn subscribe(&mut self, mailbox: &str) -> Result<()>;

    /// `UNSUBSCRIBE mailbox`.
    async fn unsubscribe(&mut self, mailbox: &str) -> Result<()>;

    /// `GETACL mailbox`.
    async fn get_acl(&mut self, mailbox: &str) -> Result<Vec<AclEntry>>;

    /// `SETACL mailbox identifier rights`.
    async fn set_acl(&mut self, mailbox: &str, entry: &AclEntry) -> Result<()>;

    /// `DELETEACL mailbox identifier`.
    async fn delete_acl(&mut self, mailbox: &str, identifier: &str) -> Result<()>;

    /// `MYRIGHTS mailbox`.
    async fn my_rights(&mut self, mailbox: &str) -> Result<Rights>;

    /// `GETQUOTAROOT mailbox`, flattened to the resources of all roots.
    async fn get_quota_root(&mut self, mailbox: &str) -> Result<Vec<QuotaResource>>;

    /// `SETMETADATA mailbox (/private/specialuse value)`; `None` clears it.
    async fn set_special_use(&mut self, mailbox: &str, special_use: Option<SpecialUse>) -> Result<()>;
}
