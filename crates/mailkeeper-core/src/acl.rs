//! ACL reconciliation (RFC 4314).
//!
//! [`reconcile`] diffs the ACL a folder should have against the ACL the
//! server reports and returns the SETACL/DELETEACL work needed. Entries are
//! keyed by resolved [`Entity`], so aliases of one identity don't produce
//! spurious changes. Identities the directory can't resolve are left alone
//! on the old side and skipped on the new side.
//!
//! Two server behaviors are absorbed before comparing rights:
//!
//! - servers grant `p` (post) implicitly; an existing `p` is carried
//!   forward when the new entry doesn't mention it, and `p` never counts
//!   as a difference;
//! - some servers refuse `s` (keep seen) on an entry that already reads
//!   without it, so a newly requested `s` is dropped in that case.

use std::collections::HashMap;

use mailkeeper_imap::{AclEntry, Rights, Transport};
use tracing::{debug, warn};

use crate::error::{Error, Result, Warning};
use crate::identity::{Entity, IdentityError, IdentityService};

/// Work produced by [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclChanges {
    /// Entries to set, with their final rights.
    pub to_add: Vec<AclEntry>,
    /// Identifiers to delete.
    pub to_remove: Vec<String>,
}

impl AclChanges {
    /// Whether there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

fn resolve(identities: &dyn IdentityService, identifier: &str) -> Option<Entity> {
    match identities.resolve_entity(identifier) {
        Ok(entity) => Some(entity),
        Err(IdentityError::Unknown(_)) => {
            debug!(identifier, "unknown ACL identity, skipped");
            None
        }
        Err(err @ IdentityError::Lookup(_)) => {
            warn!(identifier, error = %err, "ACL identity lookup failed, skipped");
            None
        }
    }
}

/// Rights to request for an entity, given what it holds today.
#[must_use]
pub fn effective_rights(old: Option<Rights>, new: Rights) -> Rights {
    let Some(old) = old else {
        return new;
    };
    let mut rights = new;
    if old.contains(Rights::POST) && !new.contains(Rights::POST) {
        rights |= Rights::POST;
    }
    if old.contains(Rights::READ)
        && new.contains(Rights::READ)
        && !old.contains(Rights::KEEP_SEEN)
        && new.contains(Rights::KEEP_SEEN)
    {
        rights.remove(Rights::KEEP_SEEN);
    }
    rights
}

/// Whether `new` would change an entry currently holding `old`.
#[must_use]
pub fn differs(old: Rights, new: Rights) -> bool {
    effective_rights(Some(old), new).without_post() != old.without_post()
}

/// Computes the changes turning `old` into `new` on `folder`.
///
/// # Errors
///
/// Returns [`Error::NoAdminAcl`] when the changes are non-empty and no
/// entry with administer rights would remain. Nothing is applied in that
/// case.
pub fn reconcile(
    folder: &str,
    old: &[AclEntry],
    new: &[AclEntry],
    identities: &dyn IdentityService,
) -> Result<AclChanges> {
    let mut old_resolved: Vec<(Entity, &AclEntry)> = Vec::new();
    let mut unresolved_old: Vec<&AclEntry> = Vec::new();
    for entry in old {
        match resolve(identities, &entry.identifier) {
            Some(entity) => old_resolved.push((entity, entry)),
            None => unresolved_old.push(entry),
        }
    }
    let old_map: HashMap<Entity, &AclEntry> = old_resolved.iter().copied().collect();

    let mut new_map: HashMap<Entity, &AclEntry> = HashMap::new();
    for entry in new {
        if let Some(entity) = resolve(identities, &entry.identifier) {
            new_map.insert(entity, entry);
        }
    }

    let mut changes = AclChanges::default();
    let mut surviving: HashMap<Entity, Rights> = HashMap::new();

    for (entity, entry) in &old_resolved {
        if new_map.contains_key(entity) {
            surviving.insert(*entity, old_map[entity].rights);
        } else if !changes.to_remove.contains(&entry.identifier) {
            changes.to_remove.push(entry.identifier.clone());
        }
    }

    let mut new_sorted: Vec<(&Entity, &&AclEntry)> = new_map.iter().collect();
    new_sorted.sort_by_key(|(entity, _)| **entity);
    for (entity, entry) in new_sorted {
        let current = old_map.get(entity).map(|e| e.rights);
        let rights = effective_rights(current, entry.rights);
        let changed = current.is_none_or(|c| rights.without_post() != c.without_post());
        if changed {
            changes
                .to_add
                .push(AclEntry::new(entry.identifier.clone(), rights));
            surviving.insert(*entity, rights);
        }
    }

    if !changes.is_empty() {
        let has_admin = surviving.values().any(|r| r.is_admin())
            || unresolved_old.iter().any(|e| e.rights.is_admin());
        if !has_admin {
            return Err(Error::NoAdminAcl(folder.to_string()));
        }
    }
    Ok(changes)
}

/// Whether two ACL sets are equal after identity resolution.
#[must_use]
pub fn acls_equal(a: &[AclEntry], b: &[AclEntry], identities: &dyn IdentityService) -> bool {
    let key = |list: &[AclEntry]| -> HashMap<Entity, Rights> {
        list.iter()
            .filter_map(|e| resolve(identities, &e.identifier).map(|id| (id, e.rights.without_post())))
            .collect()
    };
    key(a) == key(b)
}

/// Rewrites identifiers to their canonical names, dropping unknown ones.
#[must_use]
pub fn translate(entries: &[AclEntry], identities: &dyn IdentityService) -> Vec<AclEntry> {
    entries
        .iter()
        .filter_map(|entry| {
            let entity = resolve(identities, &entry.identifier)?;
            match identities.name_for(entity) {
                Ok(name) => Some(AclEntry::new(name, entry.rights)),
                Err(err) => {
                    debug!(identifier = %entry.identifier, error = %err, "ACL entry not translatable");
                    None
                }
            }
        })
        .collect()
}

/// Applies changes one command at a time.
///
/// Additions run before removals. A failed entry is logged and returned as
/// a warning; earlier entries are not rolled back.
///
/// # Errors
///
/// Stops with [`Error::Connection`] when the connection breaks.
pub async fn apply<T: Transport + ?Sized>(
    transport: &mut T,
    folder: &str,
    changes: &AclChanges,
) -> Result<Vec<Warning>> {
    let mut warnings = Vec::new();
    for entry in &changes.to_add {
        if let Err(err) = transport.set_acl(folder, entry).await {
            if err.is_connection_error() {
                return Err(Error::Connection(err.to_string()));
            }
            warn!(folder, identifier = %entry.identifier, error = %err, "SETACL failed");
            warnings.push(Warning::AclEntryFailed {
                folder: folder.to_string(),
                identifier: entry.identifier.clone(),
                detail: err.to_string(),
            });
        }
    }
    for identifier in &changes.to_remove {
        if let Err(err) = transport.delete_acl(folder, identifier).await {
            if err.is_connection_error() {
                return Err(Error::Connection(err.to_string()));
            }
            warn!(folder, identifier, error = %err, "DELETEACL failed");
            warnings.push(Warning::AclEntryFailed {
                folder: folder.to_string(),
                identifier: identifier.clone(),
                detail: err.to_string(),
            });
        }
    }
    debug!(
        folder,
        added = changes.to_add.len(),
        removed = changes.to_remove.len(),
        failed = warnings.len(),
        "ACL changes applied"
    );
    Ok(warnings)
}
