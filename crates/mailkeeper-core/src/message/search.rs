//! Searching and sorting.
//!
//! Sorting goes to the server when it advertises SORT and the key has a
//! SORT atom, using ESORT and SORT=DISPLAY when both the server and the
//! configuration allow them. A rejected SORT falls back to searching plus
//! sorting in process if `fallback_on_failed_sort` is set.
//!
//! Filtering goes to the server for body terms, for folders larger than
//! `fetch_limit` and whenever `imap_search` is set. Otherwise the folder's
//! headers are fetched once and the criteria evaluated in process.

use std::ops::Range;

use chrono::{DateTime, Utc};
use mailkeeper_imap::{
    Flag, FetchProfile, FetchedMessage, Rights, SearchCriteria, SortCriterion, SortKey, SortVariant,
    Transport, Uid, UidSet,
};
use tracing::debug;

use crate::error::Result;
use crate::handle::OpenMode;
use crate::session::MailSession;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// What [`MailSession::search`] looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Filter.
    pub criteria: SearchCriteria,
    /// Sort key; `None` keeps the server's order.
    pub sort: Option<SortKey>,
    /// Sort direction.
    pub order: SortOrder,
    /// Slice of the sorted result to return.
    pub range: Option<Range<usize>>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new(SearchCriteria::All)
    }
}

impl SearchQuery {
    /// Unsorted query for `criteria`.
    #[must_use]
    pub fn new(criteria: SearchCriteria) -> Self {
        Self {
            criteria,
            sort: None,
            order: SortOrder::Ascending,
            range: None,
        }
    }

    /// Sorts by `key` in `order`.
    #[must_use]
    pub fn sorted_by(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort = Some(key);
        self.order = order;
        self
    }

    /// Returns only `range` of the sorted result.
    #[must_use]
    pub fn slice(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }
}

impl<T: Transport> MailSession<T> {
    /// UIDs of the messages in `folder` matching `query`, sorted and
    /// sliced as requested.
    ///
    /// The transport read timeout is switched to `filter_read_timeout` for
    /// the duration of the call when one is configured.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`](crate::Error::NotFound) for a missing folder
    /// - [`Error::Permission`](crate::Error::Permission) without read right
    /// - the SORT failure itself when fallback is disabled
    pub async fn search(&mut self, folder: &str, query: &SearchQuery) -> Result<Vec<Uid>> {
        let name = self.selectable_folder(folder).await?;
        self.require_rights(&name, Rights::READ, "searching").await?;
        let status = self.open_folder(&name, OpenMode::ReadOnly).await?;
        if status.exists == 0 {
            return Ok(Vec::new());
        }

        let filter_timeout = self.engine.properties().filter_read_timeout;
        if filter_timeout.is_some() {
            self.transport.set_read_timeout(filter_timeout);
        }
        let result = self.search_open(&name, query, status.exists).await;
        if filter_timeout.is_some() {
            let timeout = self.engine.properties().read_timeout;
            self.transport.set_read_timeout(timeout);
        }

        let uids = result?;
        Ok(match &query.range {
            Some(range) => uids
                .into_iter()
                .skip(range.start)
                .take(range.end.saturating_sub(range.start))
                .collect(),
            None => uids,
        })
    }

    async fn search_open(&mut self, name: &str, query: &SearchQuery, exists: u32) -> Result<Vec<Uid>> {
        if let Some(key) = query.sort {
            if let Some(sorted) = self.server_sort(name, key, query.order, &query.criteria).await? {
                return Ok(sorted);
            }
        }
        let uids = self.filter(name, &query.criteria, exists).await?;
        match query.sort {
            Some(key) if uids.len() > 1 => self.sort_locally(name, uids, key, query.order).await,
            _ => Ok(uids),
        }
    }

    fn sort_variant(&self, key: SortKey) -> Option<SortVariant> {
        let caps = self.transport.capabilities();
        let props = self.engine.properties();
        if !caps.supports_sort() || key.atom().is_none() {
            return None;
        }
        if key.is_display() && !(props.allow_sort_display && caps.supports_sort_display()) {
            return None;
        }
        Some(if props.allow_esort && caps.supports_esort() {
            SortVariant::Extended
        } else {
            SortVariant::Plain
        })
    }

    /// Server-side sort; `None` when the caller has to sort in process.
    async fn server_sort(
        &mut self,
        name: &str,
        key: SortKey,
        order: SortOrder,
        criteria: &SearchCriteria,
    ) -> Result<Option<Vec<Uid>>> {
        let Some(variant) = self.sort_variant(key) else {
            return Ok(None);
        };
        let criterion = match order {
            SortOrder::Ascending => SortCriterion::ascending(key),
            SortOrder::Descending => SortCriterion::descending(key),
        };
        match self.transport.uid_sort(&[criterion], criteria, variant).await {
            Ok(uids) => Ok(Some(uids)),
            Err(err) if !err.is_connection_error() && self.engine.properties().fallback_on_failed_sort => {
                debug!(folder = name, ?key, error = %err, "SORT rejected, sorting in process");
                Ok(None)
            }
            Err(err) => Err(self.fail(name, err)),
        }
    }

    async fn filter(&mut self, name: &str, criteria: &SearchCriteria, exists: u32) -> Result<Vec<Uid>> {
        let props = self.engine.properties();
        let large = usize::try_from(exists).unwrap_or(usize::MAX) > props.fetch_limit;
        if props.imap_search || large || criteria.needs_body() {
            return self
                .transport
                .uid_search(criteria)
                .await
                .map_err(|e| self.fail(name, e));
        }
        let messages = self
            .fetch_open(name, &UidSet::All, FetchProfile::NoStructure)
            .await?;
        let mut uids: Vec<Uid> = messages
            .iter()
            .filter(|m| matches(m, criteria))
            .map(|m| m.uid)
            .collect();
        uids.sort_unstable();
        debug!(folder = name, scanned = messages.len(), matched = uids.len(), "filtered in process");
        Ok(uids)
    }

    async fn sort_locally(&mut self, name: &str, uids: Vec<Uid>, key: SortKey, order: SortOrder) -> Result<Vec<Uid>> {
        let mut messages = Vec::with_capacity(uids.len());
        for chunk in uids.chunks(self.engine.properties().fetch_limit) {
            if let Some(set) = UidSet::from_uids(chunk) {
                messages.extend(self.fetch_open(name, &set, FetchProfile::NoStructure).await?);
            }
        }
        let mut keyed: Vec<(SortValue, Uid)> = messages
            .iter()
            .map(|m| (SortValue::of(m, key), m.uid))
            .collect();
        keyed.sort();
        if order == SortOrder::Descending {
            keyed.reverse();
        }
        Ok(keyed.into_iter().map(|(_, uid)| uid).collect())
    }
}

/// In-process evaluation of search criteria against fetched headers.
///
/// Body terms can't be evaluated here and match everything; such
/// criteria are always sent to the server.
pub(crate) fn matches(message: &FetchedMessage, criteria: &SearchCriteria) -> bool {
    let flags = &message.flags;
    match criteria {
        SearchCriteria::All | SearchCriteria::Body(_) | SearchCriteria::Text(_) => true,
        SearchCriteria::Answered => flags.contains(&Flag::Answered),
        SearchCriteria::Deleted => flags.is_deleted(),
        SearchCriteria::Draft => flags.is_draft(),
        SearchCriteria::Flagged => flags.is_flagged(),
        SearchCriteria::Undeleted => !flags.is_deleted(),
        SearchCriteria::Seen => flags.is_seen(),
        SearchCriteria::Unseen => !flags.is_seen(),
        SearchCriteria::Keyword(keyword) => flags.iter().any(|f| match f {
            Flag::Keyword(k) => k.eq_ignore_ascii_case(keyword),
            _ => false,
        }),
        SearchCriteria::Uids(set) => set.contains(message.uid),
        SearchCriteria::Subject(needle) => header_contains(message, "Subject", needle),
        SearchCriteria::From(needle) => header_contains(message, "From", needle),
        SearchCriteria::To(needle) => header_contains(message, "To", needle),
        SearchCriteria::Cc(needle) => header_contains(message, "Cc", needle),
        SearchCriteria::Header(name, needle) => header_contains(message, name, needle),
        SearchCriteria::Since(date) => message
            .internal_date
            .is_some_and(|d| d.date_naive() >= *date),
        SearchCriteria::Before(date) => message
            .internal_date
            .is_some_and(|d| d.date_naive() < *date),
        SearchCriteria::Larger(size) => message.size > *size,
        SearchCriteria::Smaller(size) => message.size < *size,
        SearchCriteria::And(items) => items.iter().all(|c| matches(message, c)),
        SearchCriteria::Or(a, b) => matches(message, a) || matches(message, b),
        SearchCriteria::Not(inner) => !matches(message, inner),
    }
}

fn header_contains(message: &FetchedMessage, name: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    message
        .headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case(name))
        .any(|(_, v)| v.to_lowercase().contains(&needle))
}

/// Comparable value of one message under one sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Text(String),
    Number(u64),
    Time(Option<DateTime<Utc>>),
    Flag(bool),
}

impl SortValue {
    fn of(message: &FetchedMessage, key: SortKey) -> Self {
        let header = |name: &str| message.header(name).unwrap_or_default().trim().to_lowercase();
        match key {
            SortKey::Arrival => Self::Time(message.internal_date),
            SortKey::Date => Self::Time(
                message
                    .header("Date")
                    .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                    .map(|d| d.with_timezone(&Utc))
                    .or(message.internal_date),
            ),
            SortKey::From => Self::Text(address(&header("From"))),
            SortKey::To => Self::Text(address(&header("To"))),
            SortKey::Cc => Self::Text(address(&header("Cc"))),
            SortKey::DisplayFrom => Self::Text(display_name(&header("From"))),
            SortKey::DisplayTo => Self::Text(display_name(&header("To"))),
            SortKey::Subject => Self::Text(base_subject(&header("Subject"))),
            SortKey::Size => Self::Number(u64::from(message.size)),
            SortKey::Flagged => Self::Flag(message.flags.is_flagged()),
            SortKey::Seen => Self::Flag(message.flags.is_seen()),
        }
    }
}

/// First mailbox of an address list, without the display name.
fn address(value: &str) -> String {
    let first = value.split(',').next().unwrap_or_default().trim();
    match (first.find('<'), first.rfind('>')) {
        (Some(start), Some(end)) if start < end => first[start + 1..end].trim().to_string(),
        _ => first.to_string(),
    }
}

/// Display name of the first mailbox, its address when there is none.
fn display_name(value: &str) -> String {
    let first = value.split(',').next().unwrap_or_default().trim();
    match first.find('<') {
        Some(start) if start > 0 => first[..start].trim().trim_matches('"').trim().to_string(),
        _ => address(first),
    }
}

/// Subject with reply and forward prefixes removed.
fn base_subject(subject: &str) -> String {
    const PREFIXES: [&str; 4] = ["re:", "fwd:", "fw:", "aw:"];
    let mut rest = subject.trim();
    loop {
        let stripped = PREFIXES
            .iter()
            .find(|p| rest.get(..p.len()).is_some_and(|head| head.eq_ignore_ascii_case(p)))
            .and_then(|p| rest.get(p.len()..))
            .map(str::trim_start);
        match stripped {
            Some(next) => rest = next,
            None => break,
        }
    }
    rest.trim_end_matches("(fwd)").trim().to_string()
}
