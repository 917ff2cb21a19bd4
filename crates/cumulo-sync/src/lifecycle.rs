//! Item lifecycle workflows: move, trash, restore
//!
//! Each operation is a small state machine: remote call first, store
//! mutation to reflect the new remote truth second, then a re-read of the
//! updated record. On remote failure nothing is mutated locally; on local
//! follow-up failure the error is surfaced for caller-level retry.
//!
//! The trash and restore protocols are causally ordered: trash captures
//! the pre-trash child set BEFORE issuing the remote delete, so object ids
//! can be re-adopted from the post-trash listing; restore verifies the
//! original slot AFTER the remote restore and falls back to scanning the
//! parent before declaring the tree out of sync.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use cumulo_core::config::Config;
use cumulo_core::domain::{Account, Etag, FileId, ItemId, ItemRecord, RemoteUrl};
use cumulo_core::ports::{EnumerateDepth, RemoteClient, RemoteEntry, RemoteError};
use cumulo_store::ItemStore;

use crate::capabilities::CapabilityCache;
use crate::error::OperationError;

/// Lifecycle workflow executor for one account
///
/// Holds the store, the remote port, and the shared capability cache.
/// Operations on distinct items may run concurrently; the record `status`
/// is the (best-effort) guard against racing an in-flight transfer on the
/// same item.
pub struct ItemOperations {
    pub(crate) account: Account,
    pub(crate) store: Arc<ItemStore>,
    pub(crate) remote: Arc<dyn RemoteClient>,
    pub(crate) capabilities: Arc<CapabilityCache>,
    pub(crate) chunk_threshold: u64,
    pub(crate) chunk_size: usize,
}

impl ItemOperations {
    /// Creates a workflow executor for `account`
    pub fn new(
        account: Account,
        store: Arc<ItemStore>,
        remote: Arc<dyn RemoteClient>,
        capabilities: Arc<CapabilityCache>,
        config: &Config,
    ) -> Self {
        Self {
            account,
            store,
            remote,
            capabilities,
            chunk_threshold: config.chunk_threshold_bytes(),
            chunk_size: config.chunk_size_bytes() as usize,
        }
    }

    /// Returns the account this executor operates on
    pub fn account(&self) -> &Account {
        &self.account
    }

    // ========================================================================
    // Move
    // ========================================================================

    /// Moves or renames an item
    ///
    /// Remote move first; on success the store-level rename (leaf rename
    /// or cascading directory rename) follows, and the updated record is
    /// re-read. A remote failure is disambiguated against the destination:
    /// if the destination turns out to exist, the caller gets
    /// [`OperationError::AlreadyExists`] rather than a generic failure.
    pub async fn move_item(
        &self,
        item_id: &ItemId,
        new_parent: &RemoteUrl,
        new_name: Option<&str>,
    ) -> Result<ItemRecord, OperationError> {
        let record = self
            .store
            .get(item_id)
            .await?
            .filter(|r| !r.deleted)
            .ok_or(OperationError::NotFound)?;

        let source = record.full_url()?;
        let name = new_name.unwrap_or(&record.file_name);
        let destination = new_parent.join(name)?;

        if let Err(e) = self.remote.move_item(&source, &destination, false).await {
            return Err(self.disambiguate_collision(e, &destination).await);
        }

        self.store.rename_item(item_id, new_parent, name).await?;

        let updated = self
            .store
            .get(item_id)
            .await?
            .ok_or_else(|| OperationError::ItemVanished(item_id.to_string()))?;

        info!(item_id = %item_id, from = %source, to = %destination, "Moved item");
        Ok(updated)
    }

    /// Turns an ambiguous remote failure into `AlreadyExists` when the
    /// destination is occupied
    async fn disambiguate_collision(
        &self,
        error: RemoteError,
        destination: &RemoteUrl,
    ) -> OperationError {
        if error == RemoteError::Collision {
            return OperationError::AlreadyExists;
        }
        match self
            .remote
            .enumerate(destination, EnumerateDepth::Target, true)
            .await
        {
            Ok(entries) if !entries.is_empty() => {
                debug!(destination = %destination, "Destination occupied, reporting collision");
                OperationError::AlreadyExists
            }
            _ => error.into(),
        }
    }

    // ========================================================================
    // Trash
    // ========================================================================

    /// Moves an item to the server trash bin
    ///
    /// Precondition: the server reports trash support (checked through the
    /// capability cache; fails with `Unsupported` before any remote call
    /// otherwise). The object id is preserved through the round-trip even
    /// when the server renames the item or substitutes the file id, and
    /// former children are re-identified the same way. A missing match
    /// after a full trash-bin scan reports `OutOfSync`, not a hard
    /// failure.
    pub async fn trash_item(&self, item_id: &ItemId) -> Result<ItemRecord, OperationError> {
        if !self
            .capabilities
            .supports_trash(&self.account, self.remote.as_ref())
            .await
        {
            return Err(OperationError::Unsupported("trash"));
        }

        let mut record = self
            .store
            .get(item_id)
            .await?
            .filter(|r| !r.deleted)
            .ok_or(OperationError::NotFound)?;
        let source = record.full_url()?;

        // Capture the pre-trash child set before the tree moves.
        let pre_trash_children = if record.directory {
            self.store
                .list_under(&self.account.id(), &source, false)
                .await?
        } else {
            Vec::new()
        };

        self.remote.delete(&source).await.map_err(OperationError::from)?;

        // Locate the trashed entry: the server may have renamed the item
        // and may report the file id in place of the object id.
        let trashed_entries = self.remote.trashed_items().await.map_err(OperationError::from)?;
        let Some(entry) = trashed_entries
            .iter()
            .find(|e| e.matches(&record.item_id, &record.file_id))
        else {
            return Err(OperationError::OutOfSync(format!(
                "{source} missing from trash listing after delete"
            )));
        };

        entry.adopt_into(&mut record)?;
        self.store.upsert(&record).await?;

        if record.directory {
            self.readopt_trashed_children(&record, pre_trash_children)
                .await?;
        }

        info!(item_id = %item_id, trashed_as = %record.file_name, "Trashed item");
        Ok(record)
    }

    /// Re-identifies the former children of a trashed directory
    ///
    /// Enumerates the subtree at its post-trash location and matches each
    /// pre-trash child by object id or file id so ids survive the
    /// round-trip.
    async fn readopt_trashed_children(
        &self,
        trashed_dir: &ItemRecord,
        pre_trash_children: Vec<ItemRecord>,
    ) -> Result<(), OperationError> {
        if pre_trash_children.is_empty() {
            return Ok(());
        }

        let trashed_url = trashed_dir.full_url()?;
        let entries = self
            .remote
            .enumerate(&trashed_url, EnumerateDepth::Infinity, true)
            .await
            .map_err(OperationError::from)?;

        for child in pre_trash_children {
            let Some(entry) = entries.iter().find(|e| entry_matches_record(e, &child)) else {
                return Err(OperationError::OutOfSync(format!(
                    "child {} missing after trashing {}",
                    child.item_id, trashed_dir.item_id
                )));
            };

            let url = RemoteUrl::new(entry.url.clone())
                .map_err(OperationError::Domain)?;
            let Some((server_url, file_name)) = url.parent_and_name() else {
                return Err(OperationError::OutOfSync(format!(
                    "unsplittable trashed child url {url}"
                )));
            };

            let mut updated = child;
            updated.server_url = server_url;
            updated.file_name_view = file_name.clone();
            updated.file_name = file_name;
            updated.file_id = FileId::new(entry.file_id.clone())?;
            updated.etag = Etag::new(entry.etag.clone())?;
            updated.sync_time = Utc::now();
            self.store.upsert(&updated).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Restore
    // ========================================================================

    /// Restores a trashed item to its original location
    ///
    /// Precondition: the record carries a non-empty original-location
    /// field captured at trash time. The restored slot is verified by
    /// object id; when another item occupies it (a second trash/restore
    /// race), the parent directory is scanned for the expected id before
    /// giving up with a sync-conflict error.
    pub async fn restore_item(&self, item_id: &ItemId) -> Result<ItemRecord, OperationError> {
        let record = self
            .store
            .get(item_id)
            .await?
            .filter(|r| !r.deleted)
            .ok_or(OperationError::NotFound)?;

        let original_location = record
            .trash
            .as_ref()
            .map(|t| t.original_location.clone())
            .filter(|loc| !loc.is_empty())
            .ok_or_else(|| {
                OperationError::OutOfSync(format!(
                    "trashed record {item_id} carries no original location"
                ))
            })?;

        let trashed_url = record.full_url()?;
        let target_url = RemoteUrl::new(format!(
            "{}/{}",
            self.account.files_url(),
            original_location
        ))?;

        self.remote
            .restore_from_trash(&trashed_url, &target_url)
            .await
            .map_err(OperationError::from)?;

        let (parent_url, _) = target_url
            .parent_and_name()
            .ok_or_else(|| OperationError::OutOfSync(format!("unsplittable target {target_url}")))?;

        // Resolve the restored parent, falling back to a remote lookup
        // when it is not locally known (e.g. never enumerated).
        if parent_url != self.account.files_url()
            && self
                .store
                .get_by_url(&self.account.id(), &parent_url)
                .await?
                .is_none()
        {
            debug!(parent = %parent_url, "Restored parent unknown locally, fetching");
            let entries = self
                .remote
                .enumerate(&parent_url, EnumerateDepth::Target, true)
                .await
                .map_err(OperationError::from)?;
            if let Some(parent_entry) = entries.first() {
                let parent_record = parent_entry.into_record(&self.account)?;
                self.store.upsert(&parent_record).await?;
            }
        }

        // Verify the original slot; another item may already occupy it.
        let entry = match self.lookup_restored(&target_url, &record).await? {
            Some(entry) => entry,
            None => {
                return Err(OperationError::OutOfSync(format!(
                    "{} not found at {} after restore",
                    record.item_id, target_url
                )))
            }
        };

        let mut restored = entry.into_record(&self.account)?.with_local_state(&record, true);
        restored.trash = None;
        restored.sync_time = Utc::now();
        self.store.upsert(&restored).await?;

        info!(item_id = %item_id, target = %target_url, "Restored item from trash");
        Ok(restored)
    }

    /// Finds the restored entry at its expected slot, scanning the parent
    /// directory as a fallback
    async fn lookup_restored(
        &self,
        target_url: &RemoteUrl,
        record: &ItemRecord,
    ) -> Result<Option<RemoteEntry>, OperationError> {
        match self
            .remote
            .enumerate(target_url, EnumerateDepth::Target, true)
            .await
        {
            Ok(entries) => {
                if let Some(entry) = entries.first() {
                    if entry_matches_record(entry, record) {
                        return Ok(Some(entry.clone()));
                    }
                    warn!(
                        target = %target_url,
                        found = %entry.id,
                        "Another item occupies the restored slot, scanning parent"
                    );
                }
            }
            Err(RemoteError::NotFound) => {
                warn!(target = %target_url, "Restored slot empty, scanning parent");
            }
            Err(e) => return Err(e.into()),
        }

        let Some((parent_url, _)) = target_url.parent_and_name() else {
            return Ok(None);
        };
        let entries = self
            .remote
            .enumerate(&parent_url, EnumerateDepth::Children, true)
            .await
            .map_err(OperationError::from)?;
        Ok(entries
            .into_iter()
            .skip(1) // the parent's own entry
            .find(|e| entry_matches_record(e, record)))
    }
}

/// True if a listing entry carries one of the record's identifiers
///
/// Servers may report the secondary file id in place of the object id
/// after a trash round-trip; both are consulted in both positions.
pub(crate) fn entry_matches_record(entry: &RemoteEntry, record: &ItemRecord) -> bool {
    entry.id == record.item_id.as_str()
        || entry.file_id == record.file_id.as_str()
        || entry.id == record.file_id.as_str()
        || entry.file_id == record.item_id.as_str()
}
