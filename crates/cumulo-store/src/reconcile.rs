//! Directory-listing reconciliation engine
//!
//! Given a fresh remote listing for one directory level (the directory's
//! own refreshed record first, its direct children following), this module
//! computes the create/update/delete sets against the store, applies them
//! transactionally, and recurses renames to descendants.
//!
//! ## Ordering
//!
//! Cascading renames run first, each as its own transaction producing
//! additional updated records for descendants; the remaining creates,
//! updates, and tombstones then commit in ONE transaction. Store
//! transactions are the atomicity boundary: across different
//! reconciliation calls for overlapping subtrees no ordering is enforced
//! here, and callers are expected to serialize conflicting enumerations of
//! the same directory.
//!
//! ## Protection rules
//!
//! - Records whose status is not `Normal` are owned by an in-flight
//!   transfer and are never overwritten (the remote revision observed
//!   meanwhile is dropped; the next listing import picks it up).
//! - Records not yet `uploaded` are excluded from deletion candidates: the
//!   server cannot report something it has not yet seen (e.g. a pending
//!   lock file mid-upload).
//! - Tombstones are resurrected as creations when the listing reports the
//!   object id again.

use std::collections::HashSet;

use chrono::Utc;

use cumulo_core::domain::{Account, ItemRecord, RemoteUrl};

use crate::store::ItemStore;
use crate::StoreError;

/// Result sets of one reconciliation pass
///
/// Returned to the caller for propagation (e.g. into the change
/// notification channel). Reconciling an unchanged listing twice yields
/// empty sets on the second call.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Records newly inserted (or resurrected from a tombstone)
    pub created: Vec<ItemRecord>,
    /// Records overwritten because a server-comparable field changed,
    /// including descendants touched by cascading renames
    pub updated: Vec<ItemRecord>,
    /// Records tombstoned because the listing no longer reports them
    pub deleted: Vec<ItemRecord>,
}

impl ReconcileOutcome {
    /// True when the pass changed nothing
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// A directory whose path changed and whose descendants must follow
struct PendingRename {
    record: ItemRecord,
    new_parent: RemoteUrl,
    new_name: String,
}

impl ItemStore {
    /// Imports a fresh depth-1 listing of `directory_url`
    ///
    /// `fresh` carries the directory's own refreshed record first and its
    /// direct children after it, already mapped into [`ItemRecord`]s.
    /// `keep_existing_download_state` preserves local `downloaded` bits
    /// across updates (pass true when the caller knows content did not
    /// change).
    ///
    /// An empty child list for an existing directory legitimately
    /// tombstones every previously known child ("directory emptied").
    pub async fn reconcile_directory_listing(
        &self,
        account: &Account,
        directory_url: &RemoteUrl,
        fresh: Vec<ItemRecord>,
        keep_existing_download_state: bool,
    ) -> Result<ReconcileOutcome, StoreError> {
        let account_id = account.id();
        let now = Utc::now();

        // Split the listing into the directory's own record and children.
        let mut target: Option<ItemRecord> = None;
        let mut children: Vec<ItemRecord> = Vec::with_capacity(fresh.len());
        for record in fresh {
            let full = format!("{}/{}", record.server_url, record.file_name);
            if target.is_none() && full == directory_url.as_str() {
                target = Some(record);
            } else {
                children.push(record);
            }
        }

        // Existing children eligible for deletion: uploaded (the server has
        // seen them), not tombstoned, and not the synthetic root sentinel.
        let existing_children: Vec<ItemRecord> = self
            .list_children(&account_id, directory_url)
            .await?
            .into_iter()
            .filter(|r| r.uploaded && !r.is_root(account))
            .collect();

        let fresh_ids: HashSet<&str> = children
            .iter()
            .map(|r| r.item_id.as_str())
            .collect();

        let mut to_delete: Vec<ItemRecord> = existing_children
            .into_iter()
            .filter(|r| !fresh_ids.contains(r.item_id.as_str()))
            .collect();

        // Classify fresh children into creates, updates, and renames.
        let mut to_create: Vec<ItemRecord> = Vec::new();
        let mut to_update: Vec<ItemRecord> = Vec::new();
        let mut renames: Vec<PendingRename> = Vec::new();

        for mut fresh_child in children {
            fresh_child.sync_time = now;

            let existing = self.get(&fresh_child.item_id).await?;
            match existing {
                None => to_create.push(fresh_child),
                Some(existing) if existing.deleted => {
                    // The server reports the object id again: resurrect.
                    to_create.push(fresh_child);
                }
                Some(existing) if !existing.status.is_normal() => {
                    tracing::debug!(
                        item_id = %existing.item_id,
                        status = %existing.status,
                        "Skipping in-flight record during reconciliation"
                    );
                }
                Some(existing) if existing.differs_remotely(&fresh_child) => {
                    let path_changed = existing.server_url != fresh_child.server_url
                        || existing.file_name != fresh_child.file_name;
                    if existing.directory && path_changed {
                        renames.push(PendingRename {
                            new_parent: fresh_child.server_url.clone(),
                            new_name: fresh_child.file_name.clone(),
                            record: existing.clone(),
                        });
                    }
                    to_update
                        .push(fresh_child.with_local_state(&existing, keep_existing_download_state));
                }
                Some(_) => {} // unchanged
            }
        }

        // Cascading renames first; descendants become additional updates.
        let mut rename_updates: Vec<ItemRecord> = Vec::new();
        for rename in renames {
            let moved = self
                .rename_item(&rename.record.item_id, &rename.new_parent, &rename.new_name)
                .await?;
            // The directory's own row is re-written below from the fresh
            // listing entry; only its descendants ride along here.
            rename_updates.extend(moved.into_iter().skip(1));
        }

        // The directory's own refreshed record merges last.
        let mut target_create: Option<ItemRecord> = None;
        let mut target_quiet_visit: Option<ItemRecord> = None;
        if let Some(mut fresh_target) = target {
            fresh_target.sync_time = now;
            fresh_target.visited_directory = true;

            match self.get(&fresh_target.item_id).await? {
                None => target_create = Some(fresh_target),
                Some(existing) if existing.deleted => target_create = Some(fresh_target),
                Some(existing) if !existing.status.is_normal() => {}
                Some(existing) if existing.differs_remotely(&fresh_target) => {
                    let mut merged =
                        fresh_target.with_local_state(&existing, keep_existing_download_state);
                    merged.visited_directory = true;
                    to_update.push(merged);
                }
                Some(existing) if !existing.visited_directory => {
                    // First complete listing of an already-known directory:
                    // record the visit without reporting an update.
                    let mut visited = existing;
                    visited.visited_directory = true;
                    target_quiet_visit = Some(visited);
                }
                Some(_) => {}
            }
        }
        if let Some(record) = target_create {
            to_create.push(record);
        }

        // Single transaction for every remaining create/update/delete.
        let mut tx = self.pool().begin().await?;

        for record in &to_create {
            Self::upsert_on(&mut *tx, record).await?;
        }
        for record in &to_update {
            Self::upsert_on(&mut *tx, record).await?;
        }
        for record in &mut to_delete {
            record.deleted = true;
            record.sync_time = now;
            sqlx::query("UPDATE items SET deleted = 1, sync_time = ? WHERE item_id = ?")
                .bind(now.to_rfc3339())
                .bind(record.item_id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        if let Some(record) = &target_quiet_visit {
            Self::upsert_on(&mut *tx, record).await?;
        }

        tx.commit().await?;

        let mut updated = rename_updates;
        updated.extend(to_update);

        tracing::info!(
            directory = %directory_url,
            created = to_create.len(),
            updated = updated.len(),
            deleted = to_delete.len(),
            "Reconciled directory listing"
        );

        Ok(ReconcileOutcome {
            created: to_create,
            updated,
            deleted: to_delete,
        })
    }
}
