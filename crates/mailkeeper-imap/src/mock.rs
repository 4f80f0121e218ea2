//! In-memory IMAP server model for tests.
//!
//! [`MockServer`] holds the mailbox tree, messages, subscriptions and ACLs
//! shared by every [`MockTransport`] connected to it, so several sessions
//! can observe each other's changes the way they would on a real server.
//! Every command is recorded, failures can be queued per command, and a
//! command can be paused at a [`Gate`] to interleave concurrent callers
//! deterministically.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::transport::{ServerInfo, Transport};
use crate::types::{
    AclEntry, AppendUid, Capabilities, Capability, CopyUid, FetchProfile, FetchedMessage, Flag,
    Flags, ListEntry, MailboxAttribute, MailboxStatus, NamespaceDescriptor, Namespaces,
    QuotaResource, QuotaResourceName, ResponseCode, Rights, SearchCriteria, SortCriterion, SortKey,
    SortVariant, SpecialUse, StoreAction, Uid, UidSet, UidValidity,
};

const DEFAULT_CAPABILITIES: &str = "IMAP4rev1 NAMESPACE UIDPLUS MOVE ACL QUOTA SORT CHILDREN \
                                    SPECIAL-USE CREATE-SPECIAL-USE METADATA";

/// A recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Command name, e.g. `UID MOVE`.
    pub command: &'static str,
    /// Arguments as they would appear on the wire, roughly.
    pub args: String,
}

/// A message stored in the mock.
#[derive(Debug, Clone)]
pub struct MockMessage {
    /// UID inside its mailbox.
    pub uid: Uid,
    /// Current flags.
    pub flags: Flags,
    /// Raw RFC 5322 text.
    pub raw: Vec<u8>,
    /// Internal date.
    pub internal_date: DateTime<Utc>,
}

impl MockMessage {
    fn split(&self) -> (Vec<(String, String)>, String) {
        let text = String::from_utf8_lossy(&self.raw);
        let (head, body) = text
            .split_once("\r\n\r\n")
            .or_else(|| text.split_once("\n\n"))
            .unwrap_or((&text, ""));

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            } else if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        (headers, body.to_string())
    }

    fn header(&self, name: &str) -> Option<String> {
        self.split()
            .0
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone)]
struct MockMailbox {
    selectable: bool,
    no_inferiors: bool,
    special_use: Option<SpecialUse>,
    messages: Vec<MockMessage>,
    next_uid: u32,
    uid_validity: u32,
    acl: Vec<AclEntry>,
    permanent_flags: Flags,
    message_limit: Option<usize>,
}

impl MockMailbox {
    fn new(uid_validity: u32, owner: &str) -> Self {
        Self {
            selectable: true,
            no_inferiors: false,
            special_use: None,
            messages: Vec::new(),
            next_uid: 1,
            uid_validity,
            acl: vec![AclEntry::new(owner, Rights::all())],
            permanent_flags: Flags::from_vec(vec![
                Flag::Seen,
                Flag::Answered,
                Flag::Flagged,
                Flag::Deleted,
                Flag::Draft,
                Flag::AnyKeyword,
            ]),
            message_limit: None,
        }
    }

    fn push(&mut self, flags: Flags, raw: Vec<u8>) -> Uid {
        let uid = Uid::new(self.next_uid).unwrap_or(Uid(std::num::NonZeroU32::MIN));
        self.next_uid += 1;
        let flags = if self.permanent_flags.allows_keywords() {
            flags
        } else {
            flags.without_keywords()
        };
        let internal_date =
            DateTime::from_timestamp(1_700_000_000 + i64::from(uid.get()) * 60, 0).unwrap_or_default();
        self.messages.push(MockMessage {
            uid,
            flags,
            raw,
            internal_date,
        });
        uid
    }

    fn validity(&self) -> UidValidity {
        UidValidity::new(self.uid_validity).unwrap_or(UidValidity(std::num::NonZeroU32::MIN))
    }

    fn over_limit(&self, adding: usize) -> bool {
        self.message_limit
            .is_some_and(|limit| self.messages.len() + adding > limit)
    }
}

/// A pause point for one command.
#[derive(Debug, Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Waits until a caller reached the paused command.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the paused caller continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug)]
struct State {
    delimiter: char,
    capabilities: Capabilities,
    info: ServerInfo,
    namespaces: Namespaces,
    user: String,
    mailboxes: BTreeMap<String, MockMailbox>,
    subscriptions: BTreeSet<String>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, VecDeque<Option<Error>>>,
    gates: HashMap<&'static str, Arc<Gate>>,
    next_validity: u32,
}

impl State {
    fn rights_of(&self, mailbox: &str) -> Rights {
        if !self.capabilities.supports_acl() {
            return Rights::all();
        }
        self.mailboxes.get(mailbox).map_or_else(Rights::empty, |mb| {
            mb.acl
                .iter()
                .filter(|e| e.identifier == self.user || e.identifier == "anyone")
                .fold(Rights::empty(), |acc, e| acc | e.rights)
        })
    }

    fn require(&self, mailbox: &str, needed: Rights) -> Result<()> {
        if self.rights_of(mailbox).contains(needed) {
            Ok(())
        } else {
            Err(Error::no(
                ResponseCode::NoPerm,
                format!("Permission denied on {mailbox}"),
            ))
        }
    }

    fn mailbox(&self, name: &str) -> Result<&MockMailbox> {
        self.mailboxes
            .get(name)
            .ok_or_else(|| Error::no(ResponseCode::NonExistent, format!("Mailbox doesn't exist: {name}")))
    }

    fn mailbox_mut(&mut self, name: &str) -> Result<&mut MockMailbox> {
        self.mailboxes
            .get_mut(name)
            .ok_or_else(|| Error::no(ResponseCode::NonExistent, format!("Mailbox doesn't exist: {name}")))
    }

    fn target_mut(&mut self, name: &str) -> Result<&mut MockMailbox> {
        self.mailboxes
            .get_mut(name)
            .ok_or_else(|| Error::no(ResponseCode::TryCreate, format!("Mailbox doesn't exist: {name}")))
    }

    fn has_children(&self, name: &str) -> bool {
        let prefix = format!("{name}{}", self.delimiter);
        self.mailboxes.keys().any(|k| k.starts_with(&prefix))
    }

    fn parent_of(&self, name: &str) -> Option<String> {
        name.rfind(self.delimiter).map(|i| name[..i].to_string())
    }

    fn insert_mailbox(&mut self, name: &str) {
        let mut missing = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            if n.is_empty() || self.mailboxes.contains_key(&n) {
                break;
            }
            current = self.parent_of(&n);
            missing.push(n);
        }
        for n in missing.into_iter().rev() {
            let validity = self.next_validity;
            self.next_validity += 1;
            let mailbox = MockMailbox::new(validity, &self.user);
            self.mailboxes.insert(n, mailbox);
        }
    }

    fn list_entry(&self, name: &str, mailbox: &MockMailbox) -> ListEntry {
        let mut attributes = Vec::new();
        if !mailbox.selectable {
            attributes.push(MailboxAttribute::NoSelect);
        }
        if mailbox.no_inferiors {
            attributes.push(MailboxAttribute::NoInferiors);
        }
        attributes.push(if self.has_children(name) {
            MailboxAttribute::HasChildren
        } else {
            MailboxAttribute::HasNoChildren
        });
        if let Some(special) = mailbox.special_use {
            if self.capabilities.supports_special_use() {
                attributes.push(MailboxAttribute::Use(special));
            }
        }
        ListEntry::new(name, Some(self.delimiter), attributes)
    }

    fn take_failure(&mut self, command: &'static str) -> Option<Error> {
        self.failures.get_mut(command).and_then(VecDeque::pop_front).flatten()
    }
}

/// Matches a mailbox name against a LIST pattern with `*` and `%`.
fn matches_pattern(name: &[char], pattern: &[char], delimiter: char) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some(('*', rest)) => (0..=name.len()).any(|i| matches_pattern(&name[i..], rest, delimiter)),
        Some(('%', rest)) => (0..=name.len())
            .take_while(|i| *i == 0 || name[i - 1] != delimiter)
            .any(|i| matches_pattern(&name[i..], rest, delimiter)),
        Some((c, rest)) => name
            .split_first()
            .is_some_and(|(n, tail)| n == c && matches_pattern(tail, rest, delimiter)),
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_criteria(message: &MockMessage, criteria: &SearchCriteria) -> bool {
    let header_has = |name: &str, value: &str| {
        message
            .header(name)
            .is_some_and(|h| contains_ci(&h, value))
    };
    match criteria {
        SearchCriteria::All => true,
        SearchCriteria::Answered => message.flags.contains(&Flag::Answered),
        SearchCriteria::Deleted => message.flags.is_deleted(),
        SearchCriteria::Draft => message.flags.is_draft(),
        SearchCriteria::Flagged => message.flags.is_flagged(),
        SearchCriteria::Undeleted => !message.flags.is_deleted(),
        SearchCriteria::Unseen => !message.flags.is_seen(),
        SearchCriteria::Seen => message.flags.is_seen(),
        SearchCriteria::Keyword(k) => message.flags.contains(&Flag::Keyword(k.clone())),
        SearchCriteria::Uids(set) => set.contains(message.uid),
        SearchCriteria::Subject(v) => header_has("Subject", v),
        SearchCriteria::From(v) => header_has("From", v),
        SearchCriteria::To(v) => header_has("To", v),
        SearchCriteria::Cc(v) => header_has("Cc", v),
        SearchCriteria::Header(name, v) => header_has(name, v),
        SearchCriteria::Body(v) => contains_ci(&message.split().1, v),
        SearchCriteria::Text(v) => contains_ci(&String::from_utf8_lossy(&message.raw), v),
        SearchCriteria::Since(d) => message.internal_date.date_naive() >= *d,
        SearchCriteria::Before(d) => message.internal_date.date_naive() < *d,
        SearchCriteria::Larger(n) => message.raw.len() > *n as usize,
        SearchCriteria::Smaller(n) => message.raw.len() < *n as usize,
        SearchCriteria::And(items) => items.iter().all(|c| matches_criteria(message, c)),
        SearchCriteria::Or(a, b) => matches_criteria(message, a) || matches_criteria(message, b),
        SearchCriteria::Not(inner) => !matches_criteria(message, inner),
    }
}

fn sort_value(message: &MockMessage, key: SortKey) -> Result<String> {
    let header = |name: &str| message.header(name).unwrap_or_default().to_lowercase();
    Ok(match key {
        SortKey::Arrival => format!("{:020}", message.internal_date.timestamp()),
        SortKey::Date => header("Date"),
        SortKey::From | SortKey::DisplayFrom => header("From"),
        SortKey::To | SortKey::DisplayTo => header("To"),
        SortKey::Cc => header("Cc"),
        SortKey::Subject => header("Subject"),
        SortKey::Size => format!("{:020}", message.raw.len()),
        SortKey::Flagged | SortKey::Seen => {
            return Err(Error::Bad("Unknown sort criterion".to_string()));
        }
    })
}

/// Shared in-memory server.
#[derive(Debug, Clone)]
pub struct MockServer {
    state: Arc<Mutex<State>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    /// Creates a server with `/` as delimiter, an empty personal
    /// namespace, INBOX, user `alice` and a broad capability set.
    #[must_use]
    pub fn new() -> Self {
        let mut state = State {
            delimiter: '/',
            capabilities: Capabilities::parse(DEFAULT_CAPABILITIES),
            info: ServerInfo {
                host: "imap.example.com".to_string(),
                greeting: Some("* OK IMAP4rev1 mock ready".to_string()),
            },
            namespaces: Namespaces {
                personal: vec![NamespaceDescriptor::new("", Some('/'))],
                ..Namespaces::default()
            },
            user: "alice".to_string(),
            mailboxes: BTreeMap::new(),
            subscriptions: BTreeSet::new(),
            calls: Vec::new(),
            failures: HashMap::new(),
            gates: HashMap::new(),
            next_validity: 1,
        };
        state.insert_mailbox("INBOX");
        state.subscriptions.insert("INBOX".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the capability set.
    #[must_use]
    pub fn with_capabilities(self, line: &str) -> Self {
        self.lock().capabilities = Capabilities::parse(line);
        self
    }

    /// Sets the hierarchy delimiter.
    #[must_use]
    pub fn with_delimiter(self, delimiter: char) -> Self {
        self.lock().delimiter = delimiter;
        self
    }

    /// Sets the host name reported by transports.
    #[must_use]
    pub fn with_host(self, host: &str) -> Self {
        self.lock().info.host = host.to_string();
        self
    }

    /// Sets the NAMESPACE response.
    #[must_use]
    pub fn with_namespaces(self, namespaces: Namespaces) -> Self {
        self.lock().namespaces = namespaces;
        self
    }

    /// Sets the authenticated user.
    #[must_use]
    pub fn with_user(self, user: &str) -> Self {
        self.lock().user = user.to_string();
        self
    }

    /// Opens a new connection.
    #[must_use]
    pub fn connect(&self) -> MockTransport {
        let state = self.lock();
        MockTransport {
            capabilities: state.capabilities.clone(),
            info: state.info.clone(),
            state: Arc::clone(&self.state),
            selected: None,
            read_timeout: None,
        }
    }

    /// Creates a mailbox and any missing parents.
    pub fn add_mailbox(&self, name: &str) -> &Self {
        self.lock().insert_mailbox(name);
        self
    }

    /// Creates a mailbox with a special-use role.
    pub fn add_special_mailbox(&self, name: &str, special_use: SpecialUse) -> &Self {
        let mut state = self.lock();
        state.insert_mailbox(name);
        if let Some(mb) = state.mailboxes.get_mut(name) {
            mb.special_use = Some(special_use);
        }
        drop(state);
        self
    }

    /// Marks a mailbox `\NoInferiors`.
    pub fn set_no_inferiors(&self, name: &str) -> &Self {
        if let Some(mb) = self.lock().mailboxes.get_mut(name) {
            mb.no_inferiors = true;
        }
        self
    }

    /// Marks a mailbox `\Noselect`.
    pub fn set_no_select(&self, name: &str) -> &Self {
        if let Some(mb) = self.lock().mailboxes.get_mut(name) {
            mb.selectable = false;
        }
        self
    }

    /// Subscribes a name.
    pub fn subscribe(&self, name: &str) -> &Self {
        self.lock().subscriptions.insert(name.to_string());
        self
    }

    /// Replaces the ACL of a mailbox.
    pub fn set_acl(&self, name: &str, acl: Vec<AclEntry>) -> &Self {
        if let Some(mb) = self.lock().mailboxes.get_mut(name) {
            mb.acl = acl;
        }
        self
    }

    /// Replaces the PERMANENTFLAGS of a mailbox.
    pub fn set_permanent_flags(&self, name: &str, flags: Flags) -> &Self {
        if let Some(mb) = self.lock().mailboxes.get_mut(name) {
            mb.permanent_flags = flags;
        }
        self
    }

    /// Limits the number of messages a mailbox accepts.
    pub fn set_message_limit(&self, name: &str, limit: usize) -> &Self {
        if let Some(mb) = self.lock().mailboxes.get_mut(name) {
            mb.message_limit = Some(limit);
        }
        self
    }

    /// Appends a raw message and returns its UID.
    pub fn add_message(&self, mailbox: &str, raw: &str, flags: Flags) -> Option<Uid> {
        self.lock()
            .mailboxes
            .get_mut(mailbox)
            .map(|mb| mb.push(flags, raw.as_bytes().to_vec()))
    }

    /// Appends `count` generated messages.
    pub fn add_messages(&self, mailbox: &str, count: usize) -> Vec<Uid> {
        let mut state = self.lock();
        let Some(mb) = state.mailboxes.get_mut(mailbox) else {
            return Vec::new();
        };
        (0..count)
            .map(|_| {
                let n = mb.next_uid;
                let raw = format!(
                    "Subject: Message {n}\r\nFrom: sender{n}@example.com\r\nMessage-ID: <{mailbox}.{n}@mock>\r\n\r\nBody {n}\r\n"
                );
                mb.push(Flags::new(), raw.into_bytes())
            })
            .collect()
    }

    /// Queues a failure for the next call of `command`.
    pub fn fail_next(&self, command: &'static str, error: Error) -> &Self {
        self.lock().failures.entry(command).or_default().push_back(Some(error));
        self
    }

    /// Lets `passing` calls of `command` succeed, then fails the one after.
    pub fn fail_after(&self, command: &'static str, passing: usize, error: Error) -> &Self {
        let mut state = self.lock();
        let queue = state.failures.entry(command).or_default();
        queue.extend(std::iter::repeat_with(|| None).take(passing));
        queue.push_back(Some(error));
        drop(state);
        self
    }

    /// Pauses the next call of `command` until the returned gate is released.
    pub fn pause(&self, command: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock().gates.insert(command, Arc::clone(&gate));
        gate
    }

    /// Returns true if the mailbox exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.lock().mailboxes.contains_key(name)
    }

    /// Returns true if the mailbox exists and is selectable.
    #[must_use]
    pub fn is_selectable(&self, name: &str) -> bool {
        self.lock().mailboxes.get(name).is_some_and(|mb| mb.selectable)
    }

    /// All mailbox names, sorted.
    #[must_use]
    pub fn mailbox_names(&self) -> Vec<String> {
        self.lock().mailboxes.keys().cloned().collect()
    }

    /// Number of messages in a mailbox (0 if it doesn't exist).
    #[must_use]
    pub fn message_count(&self, name: &str) -> usize {
        self.lock().mailboxes.get(name).map_or(0, |mb| mb.messages.len())
    }

    /// Messages of a mailbox.
    #[must_use]
    pub fn messages(&self, name: &str) -> Vec<MockMessage> {
        self.lock()
            .mailboxes
            .get(name)
            .map(|mb| mb.messages.clone())
            .unwrap_or_default()
    }

    /// Returns true if the name is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, name: &str) -> bool {
        self.lock().subscriptions.contains(name)
    }

    /// All subscribed names, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.iter().cloned().collect()
    }

    /// ACL of a mailbox.
    #[must_use]
    pub fn acl(&self, name: &str) -> Vec<AclEntry> {
        self.lock()
            .mailboxes
            .get(name)
            .map(|mb| mb.acl.clone())
            .unwrap_or_default()
    }

    /// Special-use role of a mailbox.
    #[must_use]
    pub fn special_use(&self, name: &str) -> Option<SpecialUse> {
        self.lock().mailboxes.get(name).and_then(|mb| mb.special_use)
    }

    /// Every recorded command, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Recorded calls of one command.
    #[must_use]
    pub fn calls_of(&self, command: &str) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.command == command)
            .cloned()
            .collect()
    }

    /// Number of recorded calls of one command.
    #[must_use]
    pub fn call_count(&self, command: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.command == command).count()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[derive(Debug, Clone)]
struct Selected {
    name: String,
    read_only: bool,
}

/// One connection to a [`MockServer`].
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
    capabilities: Capabilities,
    info: ServerInfo,
    selected: Option<Selected>,
    read_timeout: Option<Duration>,
}

impl MockTransport {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current read timeout override.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    async fn enter(&self, command: &'static str, args: String) -> Result<()> {
        tracing::trace!(command, %args, "mock command");
        let gate = {
            let mut state = self.lock();
            state.calls.push(Call { command, args });
            state.gates.remove(command)
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        match self.lock().take_failure(command) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_capability(&self, capability: Capability) -> Result<()> {
        if self.capabilities.has(&capability) {
            Ok(())
        } else {
            Err(Error::Unsupported(capability))
        }
    }

    fn selected(&self) -> Result<Selected> {
        self.selected
            .clone()
            .ok_or_else(|| Error::Bad("No mailbox selected".to_string()))
    }

    fn writable(&self) -> Result<Selected> {
        let selected = self.selected()?;
        if selected.read_only {
            return Err(Error::no_text("Mailbox is read-only"));
        }
        Ok(selected)
    }

    fn open(&mut self, mailbox: &str, read_only: bool) -> Result<MailboxStatus> {
        let state = self.lock();
        let mb = state.mailbox(mailbox)?;
        if !mb.selectable {
            return Err(Error::no(ResponseCode::NonExistent, format!("{mailbox} is not selectable")));
        }
        state.require(mailbox, Rights::READ)?;
        let status = MailboxStatus {
            exists: u32::try_from(mb.messages.len()).unwrap_or(u32::MAX),
            uid_next: Uid::new(mb.next_uid),
            uid_validity: UidValidity::new(mb.uid_validity),
            permanent_flags: mb.permanent_flags.clone(),
            read_only,
        };
        drop(state);
        self.selected = Some(Selected {
            name: mailbox.to_string(),
            read_only,
        });
        Ok(status)
    }

    fn copy_into(&self, uids: &UidSet, mailbox: &str, remove: bool) -> Result<Option<CopyUid>> {
        let source = self.selected()?;
        if remove && source.read_only {
            return Err(Error::no_text("Mailbox is read-only"));
        }
        let mut state = self.lock();
        let picked: Vec<MockMessage> = state
            .mailbox(&source.name)?
            .messages
            .iter()
            .filter(|m| uids.contains(m.uid))
            .cloned()
            .collect();
        state.require(mailbox, Rights::INSERT)?;
        let target = state.target_mut(mailbox)?;
        if target.over_limit(picked.len()) {
            return Err(Error::no(ResponseCode::OverQuota, "Quota exceeded"));
        }
        let mut dest = Vec::with_capacity(picked.len());
        for message in &picked {
            let mut flags = message.flags.clone();
            flags.remove(&Flag::Recent);
            dest.push(target.push(flags, message.raw.clone()));
        }
        let validity = target.validity();
        if remove {
            let source_box = state.mailbox_mut(&source.name)?;
            source_box.messages.retain(|m| !uids.contains(m.uid));
        }
        if picked.is_empty() || !self.capabilities.supports_uidplus() {
            return Ok(None);
        }
        Ok(Some(CopyUid {
            uid_validity: validity,
            source: picked.iter().map(|m| m.uid).collect(),
            dest,
        }))
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        self.enter("LIST", format!("{reference:?} {pattern:?}")).await?;
        let state = self.lock();
        if pattern.is_empty() {
            return Ok(vec![ListEntry::new(
                "",
                Some(state.delimiter),
                vec![MailboxAttribute::NoSelect],
            )]);
        }
        let full: Vec<char> = format!("{reference}{pattern}").chars().collect();
        Ok(state
            .mailboxes
            .iter()
            .filter(|(name, _)| {
                let chars: Vec<char> = name.chars().collect();
                matches_pattern(&chars, &full, state.delimiter)
            })
            .map(|(name, mb)| state.list_entry(name, mb))
            .collect())
    }

    async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        self.enter("LSUB", format!("{reference:?} {pattern:?}")).await?;
        let state = self.lock();
        let full: Vec<char> = format!("{reference}{pattern}").chars().collect();
        Ok(state
            .subscriptions
            .iter()
            .filter(|name| {
                let chars: Vec<char> = name.chars().collect();
                matches_pattern(&chars, &full, state.delimiter)
            })
            .map(|name| match state.mailboxes.get(name) {
                Some(mb) => state.list_entry(name, mb),
                None => ListEntry::new(
                    name.as_str(),
                    Some(state.delimiter),
                    vec![MailboxAttribute::NoSelect],
                ),
            })
            .collect())
    }

    async fn namespace(&mut self) -> Result<Namespaces> {
        self.enter("NAMESPACE", String::new()).await?;
        self.require_capability(Capability::Namespace)?;
        Ok(self.lock().namespaces.clone())
    }

    async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.enter("SELECT", mailbox.to_string()).await?;
        self.open(mailbox, false)
    }

    async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.enter("EXAMINE", mailbox.to_string()).await?;
        self.open(mailbox, true)
    }

    async fn close(&mut self) -> Result<()> {
        self.enter("CLOSE", String::new()).await?;
        let selected = self.selected()?;
        if !selected.read_only {
            if let Ok(mb) = self.lock().mailbox_mut(&selected.name) {
                mb.messages.retain(|m| !m.flags.is_deleted());
            }
        }
        self.selected = None;
        Ok(())
    }

    async fn unselect(&mut self) -> Result<()> {
        self.enter("UNSELECT", String::new()).await?;
        self.selected = None;
        Ok(())
    }

    async fn uid_search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>> {
        self.enter("UID SEARCH", format!("{criteria:?}")).await?;
        let selected = self.selected()?;
        let state = self.lock();
        Ok(state
            .mailbox(&selected.name)?
            .messages
            .iter()
            .filter(|m| matches_criteria(m, criteria))
            .map(|m| m.uid)
            .collect())
    }

    async fn uid_sort(
        &mut self,
        sort: &[SortCriterion],
        criteria: &SearchCriteria,
        variant: SortVariant,
    ) -> Result<Vec<Uid>> {
        self.enter("UID SORT", format!("{sort:?} {criteria:?} {variant:?}")).await?;
        self.require_capability(Capability::Sort)?;
        if variant == SortVariant::Extended {
            self.require_capability(Capability::ESort)?;
        }
        if sort.iter().any(|c| c.key.is_display()) {
            self.require_capability(Capability::SortDisplay)?;
        }
        let selected = self.selected()?;
        let state = self.lock();
        let mut keyed = Vec::new();
        for message in &state.mailbox(&selected.name)?.messages {
            if !matches_criteria(message, criteria) {
                continue;
            }
            let values = sort
                .iter()
                .map(|c| sort_value(message, c.key))
                .collect::<Result<Vec<_>>>()?;
            keyed.push((values, message.uid));
        }
        keyed.sort_by(|(a, ua), (b, ub)| {
            for (i, criterion) in sort.iter().enumerate() {
                let ord = a[i].cmp(&b[i]);
                let ord = if criterion.reverse { ord.reverse() } else { ord };
                if ord.is_ne() {
                    return ord;
                }
            }
            ua.cmp(ub)
        });
        Ok(keyed.into_iter().map(|(_, uid)| uid).collect())
    }

    async fn uid_fetch(&mut self, uids: &UidSet, profile: FetchProfile) -> Result<Vec<FetchedMessage>> {
        self.enter("UID FETCH", format!("{uids} {}", profile.items())).await?;
        let selected = self.selected()?;
        let state = self.lock();
        Ok(state
            .mailbox(&selected.name)?
            .messages
            .iter()
            .filter(|m| uids.contains(m.uid))
            .map(|m| {
                let headers = m.split().0;
                match profile {
                    FetchProfile::HeadersOnly => FetchedMessage {
                        uid: m.uid,
                        flags: Flags::new(),
                        size: 0,
                        internal_date: None,
                        headers,
                        body_structure: None,
                    },
                    FetchProfile::Full | FetchProfile::NoStructure => FetchedMessage {
                        uid: m.uid,
                        flags: m.flags.clone(),
                        size: u32::try_from(m.raw.len()).unwrap_or(u32::MAX),
                        internal_date: Some(m.internal_date),
                        headers,
                        body_structure: (profile == FetchProfile::Full)
                            .then(|| "(\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 0 0)".to_string()),
                    },
                }
            })
            .collect())
    }

    async fn uid_copy(&mut self, uids: &UidSet, mailbox: &str) -> Result<Option<CopyUid>> {
        self.enter("UID COPY", format!("{uids} {mailbox}")).await?;
        self.copy_into(uids, mailbox, false)
    }

    async fn uid_move(&mut self, uids: &UidSet, mailbox: &str) -> Result<Option<CopyUid>> {
        self.enter("UID MOVE", format!("{uids} {mailbox}")).await?;
        self.require_capability(Capability::Move)?;
        self.copy_into(uids, mailbox, true)
    }

    async fn uid_store(&mut self, uids: &UidSet, action: StoreAction, flags: &Flags) -> Result<()> {
        self.enter("UID STORE", format!("{uids} {action:?} {flags}")).await?;
        let selected = self.writable()?;
        let mut state = self.lock();
        if flags.is_deleted() {
            state.require(&selected.name, Rights::DELETE_MESSAGES)?;
        }
        let mb = state.mailbox_mut(&selected.name)?;
        let allows_keywords = mb.permanent_flags.allows_keywords();
        for message in mb.messages.iter_mut().filter(|m| uids.contains(m.uid)) {
            let applicable = flags
                .iter()
                .filter(|f| allows_keywords || !f.is_keyword())
                .cloned();
            match action {
                StoreAction::Add => message.flags.extend(applicable),
                StoreAction::Remove => {
                    for flag in applicable {
                        message.flags.remove(&flag);
                    }
                }
                StoreAction::Replace => message.flags = applicable.collect(),
            }
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        self.enter("EXPUNGE", String::new()).await?;
        let selected = self.writable()?;
        let mut state = self.lock();
        state.mailbox_mut(&selected.name)?.messages.retain(|m| !m.flags.is_deleted());
        Ok(())
    }

    async fn uid_expunge(&mut self, uids: &UidSet) -> Result<()> {
        self.enter("UID EXPUNGE", uids.to_string()).await?;
        self.require_capability(Capability::UidPlus)?;
        let selected = self.writable()?;
        let mut state = self.lock();
        state
            .mailbox_mut(&selected.name)?
            .messages
            .retain(|m| !(m.flags.is_deleted() && uids.contains(m.uid)));
        Ok(())
    }

    async fn append(&mut self, mailbox: &str, flags: &Flags, message: &[u8]) -> Result<Option<AppendUid>> {
        self.enter("APPEND", format!("{mailbox} {flags} {{{}}}", message.len())).await?;
        let mut state = self.lock();
        state.require(mailbox, Rights::INSERT)?;
        let target = state.target_mut(mailbox)?;
        if target.over_limit(1) {
            return Err(Error::no(ResponseCode::OverQuota, "Quota exceeded"));
        }
        let uid = target.push(flags.clone(), message.to_vec());
        let validity = target.validity();
        if !self.capabilities.supports_uidplus() {
            return Ok(None);
        }
        Ok(Some(AppendUid {
            uid_validity: validity,
            uids: vec![uid],
        }))
    }

    async fn create(&mut self, mailbox: &str, special_use: Option<SpecialUse>) -> Result<()> {
        let args = special_use.map_or_else(|| mailbox.to_string(), |u| format!("{mailbox} (USE ({u}))"));
        self.enter("CREATE", args).await?;
        if special_use.is_some() {
            self.require_capability(Capability::CreateSpecialUse)?;
        }
        let mut state = self.lock();
        let name = mailbox.trim_end_matches(state.delimiter).to_string();
        if state.mailboxes.contains_key(&name) {
            return Err(Error::no(ResponseCode::AlreadyExists, format!("Mailbox already exists: {name}")));
        }
        if let Some(parent) = state.parent_of(&name) {
            if let Some(mb) = state.mailboxes.get(&parent) {
                if mb.no_inferiors {
                    return Err(Error::no(ResponseCode::Cannot, format!("{parent} can't have children")));
                }
                state.require(&parent, Rights::CREATE_MAILBOX)?;
            }
        }
        state.insert_mailbox(&name);
        if let Some(mb) = state.mailboxes.get_mut(&name) {
            mb.special_use = special_use;
        }
        Ok(())
    }

    async fn delete(&mut self, mailbox: &str) -> Result<()> {
        self.enter("DELETE", mailbox.to_string()).await?;
        let mut state = self.lock();
        state.mailbox(mailbox)?;
        if mailbox.eq_ignore_ascii_case("INBOX") {
            return Err(Error::no(ResponseCode::Cannot, "INBOX can't be deleted"));
        }
        state.require(mailbox, Rights::DELETE_MAILBOX)?;
        if state.has_children(mailbox) {
            let mb = state.mailbox_mut(mailbox)?;
            mb.selectable = false;
            mb.messages.clear();
        } else {
            state.mailboxes.remove(mailbox);
        }
        drop(state);
        if self.selected.as_ref().is_some_and(|s| s.name == mailbox) {
            self.selected = None;
        }
        Ok(())
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.enter("RENAME", format!("{from} {to}")).await?;
        let mut state = self.lock();
        state.mailbox(from)?;
        state.require(from, Rights::DELETE_MAILBOX)?;
        if state.mailboxes.contains_key(to) {
            return Err(Error::no(ResponseCode::AlreadyExists, format!("Mailbox already exists: {to}")));
        }
        let prefix = format!("{from}{}", state.delimiter);
        if to.starts_with(&prefix) || from.eq_ignore_ascii_case("INBOX") {
            return Err(Error::no(ResponseCode::Cannot, format!("Can't rename {from} to {to}")));
        }
        let moved: Vec<String> = state
            .mailboxes
            .keys()
            .filter(|k| k.as_str() == from || k.starts_with(&prefix))
            .cloned()
            .collect();
        if let Some(parent) = state.parent_of(to) {
            state.insert_mailbox(&parent);
        }
        for old in moved {
            if let Some(mb) = state.mailboxes.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                state.mailboxes.insert(new, mb);
            }
        }
        drop(state);
        if self.selected.as_ref().is_some_and(|s| s.name == from) {
            self.selected = None;
        }
        Ok(())
    }

    async fn subscribe(&mut self, mailbox: &str) -> Result<()> {
        self.enter("SUBSCRIBE", mailbox.to_string()).await?;
        self.lock().subscriptions.insert(mailbox.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, mailbox: &str) -> Result<()> {
        self.enter("UNSUBSCRIBE", mailbox.to_string()).await?;
        self.lock().subscriptions.remove(mailbox);
        Ok(())
    }

    async fn get_acl(&mut self, mailbox: &str) -> Result<Vec<AclEntry>> {
        self.enter("GETACL", mailbox.to_string()).await?;
        self.require_capability(Capability::Acl)?;
        let state = self.lock();
        state.require(mailbox, Rights::ADMINISTER)?;
        Ok(state.mailbox(mailbox)?.acl.clone())
    }

    async fn set_acl(&mut self, mailbox: &str, entry: &AclEntry) -> Result<()> {
        self.enter("SETACL", format!("{mailbox} {entry}")).await?;
        self.require_capability(Capability::Acl)?;
        let mut state = self.lock();
        state.require(mailbox, Rights::ADMINISTER)?;
        let mb = state.mailbox_mut(mailbox)?;
        match mb.acl.iter_mut().find(|e| e.identifier == entry.identifier) {
            Some(existing) => existing.rights = entry.rights,
            None => mb.acl.push(entry.clone()),
        }
        Ok(())
    }

    async fn delete_acl(&mut self, mailbox: &str, identifier: &str) -> Result<()> {
        self.enter("DELETEACL", format!("{mailbox} {identifier}")).await?;
        self.require_capability(Capability::Acl)?;
        let mut state = self.lock();
        state.require(mailbox, Rights::ADMINISTER)?;
        state.mailbox_mut(mailbox)?.acl.retain(|e| e.identifier != identifier);
        Ok(())
    }

    async fn my_rights(&mut self, mailbox: &str) -> Result<Rights> {
        self.enter("MYRIGHTS", mailbox.to_string()).await?;
        self.require_capability(Capability::Acl)?;
        let state = self.lock();
        state.mailbox(mailbox)?;
        Ok(state.rights_of(mailbox))
    }

    async fn get_quota_root(&mut self, mailbox: &str) -> Result<Vec<QuotaResource>> {
        self.enter("GETQUOTAROOT", mailbox.to_string()).await?;
        self.require_capability(Capability::Quota)?;
        let state = self.lock();
        let mb = state.mailbox(mailbox)?;
        Ok(mb
            .message_limit
            .map(|limit| QuotaResource {
                name: QuotaResourceName::Message,
                usage: mb.messages.len() as u64,
                limit: limit as u64,
            })
            .into_iter()
            .collect())
    }

    async fn set_special_use(&mut self, mailbox: &str, special_use: Option<SpecialUse>) -> Result<()> {
        let value = special_use.map_or_else(|| "NIL".to_string(), |u| u.to_string());
        self.enter("SETMETADATA", format!("{mailbox} /private/specialuse {value}")).await?;
        self.require_capability(Capability::Metadata)?;
        let mut state = self.lock();
        state.mailbox_mut(mailbox)?.special_use = special_use;
        Ok(())
    }
}
