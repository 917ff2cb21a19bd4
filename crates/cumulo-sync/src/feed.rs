//! Change feed and presentable-item conversion
//!
//! The host file provider tracks a working set of items and expects push
//! notifications for anything that changed since its last watermark. This
//! module projects the store's `pending_changes` query into host-facing
//! items, filtering out entries the host must never see: end-to-end
//! encrypted records (explicitly not reconciled at this layer) and
//! transient editor lock files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cumulo_core::domain::{Account, ItemId, ItemRecord};
use cumulo_store::{ItemStore, StoreError};

/// Host-facing projection of an item record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentableItem {
    pub item_id: ItemId,
    pub name: String,
    pub directory: bool,
    pub size: i64,
    pub content_type: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub downloaded: bool,
    pub keep_downloaded: bool,
    pub locked: bool,
}

impl PresentableItem {
    /// Converts a record into its host-facing form
    ///
    /// Returns `None` for records the host must not observe: tombstones,
    /// end-to-end encrypted items, and transient editor lock files.
    pub fn from_record(record: &ItemRecord) -> Option<Self> {
        if record.deleted || record.e2e_encrypted || record.is_transient_lock_file() {
            return None;
        }
        Some(Self {
            item_id: record.item_id.clone(),
            name: record.file_name_view.clone(),
            directory: record.directory,
            size: record.size,
            content_type: record.content_type.clone(),
            modified_at: record.modified_at,
            downloaded: record.downloaded,
            keep_downloaded: record.keep_downloaded,
            locked: record.lock.is_some(),
        })
    }
}

/// One batch of the push-style change feed
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    /// Items created or updated since the watermark
    pub updated: Vec<PresentableItem>,
    /// Object ids deleted since the watermark
    pub deleted: Vec<ItemId>,
    /// New watermark for the next query
    pub watermark: DateTime<Utc>,
}

/// Computes the change feed for `account` since `since`
///
/// Thin projection over [`ItemStore::pending_changes`]: materialized
/// records and tombstones past the watermark, with children of updated
/// directories included, converted to presentable items.
pub async fn changes_since(
    store: &ItemStore,
    account: &Account,
    since: DateTime<Utc>,
) -> Result<ChangeFeed, StoreError> {
    let pending = store.pending_changes(&account.id(), since).await?;

    let watermark = pending
        .updated
        .iter()
        .chain(pending.deleted.iter())
        .map(|r| r.sync_time)
        .max()
        .unwrap_or(since);

    let updated = pending
        .updated
        .iter()
        .filter_map(PresentableItem::from_record)
        .collect();
    let deleted = pending
        .deleted
        .iter()
        .map(|r| r.item_id.clone())
        .collect();

    Ok(ChangeFeed {
        updated,
        deleted,
        watermark,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use cumulo_core::domain::{Etag, FileId, ItemStatus, RemoteUrl};
    use cumulo_store::DatabasePool;

    fn account() -> Account {
        Account::new(
            "alice",
            RemoteUrl::new("https://cloud.example.com").unwrap(),
        )
        .unwrap()
    }

    fn record(account: &Account, name: &str, id: &str) -> ItemRecord {
        ItemRecord {
            item_id: ItemId::new(id).unwrap(),
            account: account.id(),
            base_url: account.base_url().clone(),
            server_url: account.files_url(),
            file_name: name.to_string(),
            file_name_view: name.to_string(),
            directory: false,
            file_id: FileId::new(format!("f-{id}")).unwrap(),
            etag: Etag::new(format!("e-{id}")).unwrap(),
            content_type: "text/plain".to_string(),
            size: 7,
            created_at: None,
            modified_at: Some(Utc::now()),
            permissions: String::new(),
            e2e_encrypted: false,
            status: ItemStatus::Normal,
            downloaded: true,
            uploaded: true,
            lock: None,
            trash: None,
            sync_time: Utc::now(),
            deleted: false,
            visited_directory: false,
            keep_downloaded: false,
            chunk_upload_id: None,
        }
    }

    #[test]
    fn test_presentable_filters_encrypted_and_lock_files() {
        let account = account();

        assert!(PresentableItem::from_record(&record(&account, "a.txt", "id-a")).is_some());

        let mut encrypted = record(&account, "secret.txt", "id-e");
        encrypted.e2e_encrypted = true;
        assert!(PresentableItem::from_record(&encrypted).is_none());

        let lock_file = record(&account, ".~lock.report.odt#", "id-l");
        assert!(PresentableItem::from_record(&lock_file).is_none());

        let mut tombstone = record(&account, "gone.txt", "id-g");
        tombstone.deleted = true;
        assert!(PresentableItem::from_record(&tombstone).is_none());
    }

    #[tokio::test]
    async fn test_changes_since_advances_watermark() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = ItemStore::new(pool.pool().clone());
        let account = account();

        let since = Utc::now() - Duration::minutes(5);
        let feed = changes_since(&store, &account, since).await.unwrap();
        assert!(feed.updated.is_empty());
        assert_eq!(feed.watermark, since, "no changes keeps the watermark");

        store.upsert(&record(&account, "a.txt", "id-a")).await.unwrap();
        let gone = record(&account, "b.txt", "id-b");
        store.upsert(&gone).await.unwrap();
        store.tombstone(&gone.item_id).await.unwrap();

        let feed = changes_since(&store, &account, since).await.unwrap();
        assert_eq!(feed.updated.len(), 1);
        assert_eq!(feed.updated[0].name, "a.txt");
        assert_eq!(feed.deleted, vec![ItemId::new("id-b").unwrap()]);
        assert!(feed.watermark > since);

        // Re-querying from the new watermark drains the feed.
        let next = changes_since(&store, &account, feed.watermark).await.unwrap();
        assert!(next.updated.is_empty());
        assert!(next.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_feed_hides_encrypted_records_but_reports_their_deletion() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = ItemStore::new(pool.pool().clone());
        let account = account();
        let since = Utc::now() - Duration::minutes(5);

        let mut encrypted = record(&account, "vault.bin", "id-v");
        encrypted.e2e_encrypted = true;
        store.upsert(&encrypted).await.unwrap();

        let feed = changes_since(&store, &account, since).await.unwrap();
        assert!(feed.updated.is_empty(), "encrypted items never surface");

        store.tombstone(&encrypted.item_id).await.unwrap();
        let feed = changes_since(&store, &account, since).await.unwrap();
        assert_eq!(feed.deleted, vec![encrypted.item_id]);
    }
}
