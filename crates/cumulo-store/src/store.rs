//! SQLite implementation of the item metadata store
//!
//! This module provides the transactional persistence layer over
//! `ItemRecord` values. It handles all domain type serialization and SQL
//! query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type | Strategy                                |
//! |--------------------|----------|-----------------------------------------|
//! | ItemId, FileId     | TEXT     | String via `.as_str()` / `::new()`      |
//! | Etag               | TEXT     | String via `.as_str()` / `::new()`      |
//! | RemoteUrl          | TEXT     | String via `.as_str()` / `::new()`      |
//! | ItemStatus         | TEXT     | `.as_str()` / `ItemStatus::parse()`     |
//! | LockState          | 3 cols   | owner / kind / expiry, NULL when absent |
//! | TrashState         | 2 cols   | original location / deletion time       |
//! | UploadSessionId    | TEXT     | UUID string                             |
//! | DateTime<Utc>      | TEXT     | ISO 8601 via `to_rfc3339()`             |
//!
//! Reads return owned value copies, never live references: callers act on
//! a snapshot while other writers proceed concurrently.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use cumulo_core::domain::{
    Etag, FileId, ItemId, ItemRecord, ItemStatus, LockKind, LockState, RemoteUrl, TrashState,
    UploadSessionId,
};

use crate::StoreError;

/// SQLite-backed metadata store for one account
///
/// All operations are performed through a connection pool; individual
/// multi-record mutations open explicit transactions, which are the
/// atomicity boundary of the sync core.
pub struct ItemStore {
    pool: SqlitePool,
}

/// One chunk of an in-progress chunked-upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: i64,
    pub offset: i64,
    pub length: i64,
}

/// Result of a change-feed query
///
/// `updated` carries materialized records written since the watermark,
/// plus the direct children of any updated directory (so consumers never
/// miss an update to a just-refreshed parent whose children were not
/// themselves re-touched). `deleted` carries tombstones past the
/// watermark.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    pub updated: Vec<ItemRecord>,
    pub deleted: Vec<ItemRecord>,
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("Failed to parse datetime '{}': {}", s, e)))
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// Reconstruct an ItemRecord from a database row
pub(crate) fn record_from_row(row: &SqliteRow) -> Result<ItemRecord, StoreError> {
    let item_id: String = row.try_get("item_id")?;
    let base_url: String = row.try_get("base_url")?;
    let server_url: String = row.try_get("server_url")?;
    let file_id: String = row.try_get("file_id")?;
    let etag: String = row.try_get("etag")?;
    let status: String = row.try_get("status")?;

    let lock_owner: Option<String> = row.try_get("lock_owner")?;
    let lock = match lock_owner {
        Some(owner) => {
            let kind: Option<String> = row.try_get("lock_kind")?;
            let kind = LockKind::parse(kind.as_deref().unwrap_or("user"))?;
            let expires_at: Option<String> = row.try_get("lock_expires_at")?;
            Some(LockState {
                owner,
                kind,
                expires_at: parse_optional_datetime(expires_at)?,
            })
        }
        None => None,
    };

    let trash_original_location: Option<String> = row.try_get("trash_original_location")?;
    let trash = match trash_original_location {
        Some(original_location) => {
            let deleted_at: Option<String> = row.try_get("trash_deleted_at")?;
            Some(TrashState {
                original_location,
                deleted_at: parse_optional_datetime(deleted_at)?,
            })
        }
        None => None,
    };

    let chunk_upload_id: Option<String> = row.try_get("chunk_upload_id")?;
    let chunk_upload_id = match chunk_upload_id {
        Some(ref s) if !s.is_empty() => Some(
            UploadSessionId::from_str(s)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
        ),
        _ => None,
    };

    let created_at: Option<String> = row.try_get("created_at")?;
    let modified_at: Option<String> = row.try_get("modified_at")?;
    let sync_time: String = row.try_get("sync_time")?;

    Ok(ItemRecord {
        item_id: ItemId::new(item_id)?,
        account: row.try_get("account")?,
        base_url: RemoteUrl::new(base_url)?,
        server_url: RemoteUrl::new(server_url)?,
        file_name: row.try_get("file_name")?,
        file_name_view: row.try_get("file_name_view")?,
        directory: row.try_get::<i64, _>("directory")? != 0,
        file_id: FileId::new(file_id)?,
        etag: Etag::new(etag)?,
        content_type: row.try_get("content_type")?,
        size: row.try_get("size")?,
        created_at: parse_optional_datetime(created_at)?,
        modified_at: parse_optional_datetime(modified_at)?,
        permissions: row.try_get("permissions")?,
        e2e_encrypted: row.try_get::<i64, _>("e2e_encrypted")? != 0,
        status: ItemStatus::parse(&status)?,
        downloaded: row.try_get::<i64, _>("downloaded")? != 0,
        uploaded: row.try_get::<i64, _>("uploaded")? != 0,
        lock,
        trash,
        sync_time: parse_datetime(&sync_time)?,
        deleted: row.try_get::<i64, _>("deleted")? != 0,
        visited_directory: row.try_get::<i64, _>("visited_directory")? != 0,
        keep_downloaded: row.try_get::<i64, _>("keep_downloaded")? != 0,
        chunk_upload_id,
    })
}

impl ItemStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Point lookup by object id, returning an owned snapshot
    pub async fn get(&self, item_id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM items WHERE item_id = ?")
            .bind(item_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    /// Path-based lookup: splits `url` into parent directory and name
    pub async fn get_by_url(
        &self,
        account: &str,
        url: &RemoteUrl,
    ) -> Result<Option<ItemRecord>, StoreError> {
        let Some((parent, name)) = url.parent_and_name() else {
            return Ok(None);
        };

        let row = sqlx::query(
            "SELECT * FROM items WHERE account = ? AND server_url = ? AND file_name = ? \
             AND deleted = 0",
        )
        .bind(account)
        .bind(parent.as_str())
        .bind(&name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    /// Direct children of a directory (records whose parent URL matches)
    pub async fn list_children(
        &self,
        account: &str,
        directory_url: &RemoteUrl,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE account = ? AND server_url = ? AND deleted = 0 \
             ORDER BY file_name ASC",
        )
        .bind(account)
        .bind(directory_url.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Subtree scan: the item at `url` plus everything below it
    pub async fn list_under(
        &self,
        account: &str,
        url: &RemoteUrl,
        include_deleted: bool,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let pattern = format!("{}/%", url.as_str());
        let sql = if include_deleted {
            "SELECT * FROM items WHERE account = ? AND (server_url = ? OR server_url LIKE ?) \
             ORDER BY server_url ASC, file_name ASC"
        } else {
            "SELECT * FROM items WHERE account = ? AND (server_url = ? OR server_url LIKE ?) \
             AND deleted = 0 ORDER BY server_url ASC, file_name ASC"
        };

        let rows = sqlx::query(sql)
            .bind(account)
            .bind(url.as_str())
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Upsert by object id (insert or full overwrite), transactional
    pub async fn upsert(&self, record: &ItemRecord) -> Result<(), StoreError> {
        Self::upsert_on(&self.pool, record).await?;
        tracing::trace!(item_id = %record.item_id, "Saved item record");
        Ok(())
    }

    /// Upsert against an arbitrary executor (pool or open transaction)
    pub(crate) async fn upsert_on<'e, E>(executor: E, record: &ItemRecord) -> Result<(), StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            "INSERT OR REPLACE INTO items \
             (item_id, account, base_url, server_url, file_name, file_name_view, directory, \
              file_id, etag, content_type, size, created_at, modified_at, permissions, \
              e2e_encrypted, status, downloaded, uploaded, lock_owner, lock_kind, \
              lock_expires_at, trash_original_location, trash_deleted_at, sync_time, deleted, \
              visited_directory, keep_downloaded, chunk_upload_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.item_id.as_str())
        .bind(&record.account)
        .bind(record.base_url.as_str())
        .bind(record.server_url.as_str())
        .bind(&record.file_name)
        .bind(&record.file_name_view)
        .bind(record.directory as i64)
        .bind(record.file_id.as_str())
        .bind(record.etag.as_str())
        .bind(&record.content_type)
        .bind(record.size)
        .bind(record.created_at.map(|dt| dt.to_rfc3339()))
        .bind(record.modified_at.map(|dt| dt.to_rfc3339()))
        .bind(&record.permissions)
        .bind(record.e2e_encrypted as i64)
        .bind(record.status.as_str())
        .bind(record.downloaded as i64)
        .bind(record.uploaded as i64)
        .bind(record.lock.as_ref().map(|l| l.owner.clone()))
        .bind(record.lock.as_ref().map(|l| l.kind.as_str()))
        .bind(
            record
                .lock
                .as_ref()
                .and_then(|l| l.expires_at)
                .map(|dt| dt.to_rfc3339()),
        )
        .bind(record.trash.as_ref().map(|t| t.original_location.clone()))
        .bind(
            record
                .trash
                .as_ref()
                .and_then(|t| t.deleted_at)
                .map(|dt| dt.to_rfc3339()),
        )
        .bind(record.sync_time.to_rfc3339())
        .bind(record.deleted as i64)
        .bind(record.visited_directory as i64)
        .bind(record.keep_downloaded as i64)
        .bind(record.chunk_upload_id.map(|id| id.to_string()))
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Marks a record as a tombstone
    ///
    /// The row is retained (never physically removed here) so that retried
    /// listings stay idempotent and in-flight renames cannot orphan
    /// children. `sync_time` is bumped so the deletion reaches the change
    /// feed.
    pub async fn tombstone(&self, item_id: &ItemId) -> Result<(), StoreError> {
        sqlx::query("UPDATE items SET deleted = 1, sync_time = ? WHERE item_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;

        tracing::trace!(item_id = %item_id, "Tombstoned item record");
        Ok(())
    }

    /// Physically removes a tombstoned record
    ///
    /// Only legal for records already marked `deleted`; used after a
    /// subsequent successful listing confirms the server no longer knows
    /// the item.
    pub async fn purge(&self, item_id: &ItemId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM items WHERE item_id = ? AND deleted = 1")
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Status transitions
    // ------------------------------------------------------------------

    /// Transactional status transition with the bracketing side effects
    ///
    /// - entering `Downloading` clears `downloaded`;
    /// - entering `Uploading` clears `uploaded` and assigns a fresh
    ///   chunk-upload session id;
    /// - reaching `Normal` from an upload state clears the session id and
    ///   drops its chunk rows.
    ///
    /// Returns `None` (and logs a warning) if the record no longer exists:
    /// a recoverable "record vanished mid-operation" condition, not a
    /// fatal one.
    pub async fn set_status(
        &self,
        item_id: &ItemId,
        status: ItemStatus,
    ) -> Result<Option<ItemRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM items WHERE item_id = ?")
            .bind(item_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(ref row) = row else {
            tracing::warn!(item_id = %item_id, "Record vanished before status transition");
            return Ok(None);
        };
        let mut record = record_from_row(row)?;

        let previous = record.status;
        record.status = status;

        match status {
            ItemStatus::Downloading => {
                record.downloaded = false;
            }
            ItemStatus::Uploading => {
                record.uploaded = false;
                record.chunk_upload_id = Some(UploadSessionId::new());
            }
            ItemStatus::Normal if previous.is_upload_state() => {
                if let Some(session) = record.chunk_upload_id.take() {
                    sqlx::query("DELETE FROM chunk_sessions WHERE session_id = ?")
                        .bind(session.to_string())
                        .execute(&mut *tx)
                        .await?;
                }
            }
            _ => {}
        }

        Self::upsert_on(&mut *tx, &record).await?;
        tx.commit().await?;

        tracing::debug!(
            item_id = %item_id,
            from = %previous,
            to = %status,
            "Status transition"
        );
        Ok(Some(record))
    }

    // ------------------------------------------------------------------
    // Cascading rename
    // ------------------------------------------------------------------

    /// Renames an item and, for directories, rewrites every descendant
    ///
    /// The record's own path fields and all descendant `server_url`
    /// prefixes are rewritten inside ONE transaction, preserving object
    /// ids: either the whole subtree moves or none of it does. Returns
    /// the updated records, the renamed item first.
    pub async fn rename_item(
        &self,
        item_id: &ItemId,
        new_parent: &RemoteUrl,
        new_name: &str,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM items WHERE item_id = ?")
            .bind(item_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(ref row) = row else {
            return Err(StoreError::QueryFailed(format!(
                "rename target {item_id} does not exist"
            )));
        };
        let mut record = record_from_row(row)?;

        let old_subtree = record.full_url()?;
        let new_subtree = new_parent.join(new_name)?;

        let now = Utc::now();
        record.server_url = new_parent.clone();
        record.file_name = new_name.to_string();
        record.file_name_view = new_name.to_string();
        record.sync_time = now;
        Self::upsert_on(&mut *tx, &record).await?;

        let mut updated = vec![record.clone()];

        if record.directory {
            let pattern = format!("{}/%", old_subtree.as_str());
            let rows = sqlx::query(
                "SELECT * FROM items WHERE account = ? AND (server_url = ? OR server_url LIKE ?)",
            )
            .bind(&record.account)
            .bind(old_subtree.as_str())
            .bind(&pattern)
            .fetch_all(&mut *tx)
            .await?;

            for row in &rows {
                let mut child = record_from_row(row)?;
                let Some(rebased) = child.server_url.rebase(&old_subtree, &new_subtree) else {
                    // Cannot happen given the WHERE clause; abort rather
                    // than commit a half-rewritten subtree.
                    return Err(StoreError::QueryFailed(format!(
                        "descendant {} escaped subtree {}",
                        child.item_id, old_subtree
                    )));
                };
                child.server_url = rebased;
                child.sync_time = now;
                Self::upsert_on(&mut *tx, &child).await?;
                updated.push(child);
            }
        }

        tx.commit().await?;

        tracing::debug!(
            item_id = %item_id,
            from = %old_subtree,
            to = %new_subtree,
            descendants = updated.len() - 1,
            "Renamed item"
        );
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Change feed
    // ------------------------------------------------------------------

    /// Materialized records written since `since`, plus tombstones
    ///
    /// Drives the push-style change feed towards the host filesystem's
    /// working set; see [`PendingChanges`] for the child-inclusion rule.
    pub async fn pending_changes(
        &self,
        account: &str,
        since: DateTime<Utc>,
    ) -> Result<PendingChanges, StoreError> {
        let watermark = since.to_rfc3339();

        let rows = sqlx::query(
            "SELECT * FROM items WHERE account = ? AND deleted = 0 AND sync_time > ? \
             AND (downloaded = 1 OR keep_downloaded = 1 OR (directory = 1 AND visited_directory = 1)) \
             ORDER BY server_url ASC, file_name ASC",
        )
        .bind(account)
        .bind(&watermark)
        .fetch_all(&self.pool)
        .await?;

        let mut updated: Vec<ItemRecord> = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<_, _>>()?;

        // Children of updated directories ride along even when their own
        // sync_time is older than the watermark.
        let parents: Vec<ItemRecord> = updated.iter().filter(|r| r.directory).cloned().collect();
        for parent in parents {
            let parent_url = parent.full_url()?;
            for child in self.list_children(account, &parent_url).await? {
                if !updated.iter().any(|r| r.item_id == child.item_id) {
                    updated.push(child);
                }
            }
        }

        let rows = sqlx::query(
            "SELECT * FROM items WHERE account = ? AND deleted = 1 AND sync_time > ? \
             ORDER BY server_url ASC, file_name ASC",
        )
        .bind(account)
        .bind(&watermark)
        .fetch_all(&self.pool)
        .await?;

        let deleted = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<_, _>>()?;

        Ok(PendingChanges { updated, deleted })
    }

    // ------------------------------------------------------------------
    // Chunked-upload sessions
    // ------------------------------------------------------------------

    /// Records the chunk layout of an in-progress upload session
    pub async fn record_chunk_session(
        &self,
        session: &UploadSessionId,
        item_id: &ItemId,
        spans: &[ChunkSpan],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_sessions WHERE session_id = ?")
            .bind(session.to_string())
            .execute(&mut *tx)
            .await?;

        for span in spans {
            sqlx::query(
                "INSERT INTO chunk_sessions (session_id, item_id, chunk_index, start_offset, length) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(session.to_string())
            .bind(item_id.as_str())
            .bind(span.index)
            .bind(span.offset)
            .bind(span.length)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Returns the recorded chunk layout of a session, ordered by index
    pub async fn chunk_session_spans(
        &self,
        session: &UploadSessionId,
    ) -> Result<Vec<ChunkSpan>, StoreError> {
        let rows = sqlx::query(
            "SELECT chunk_index, start_offset, length FROM chunk_sessions \
             WHERE session_id = ? ORDER BY chunk_index ASC",
        )
        .bind(session.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut spans = Vec::with_capacity(rows.len());
        for row in &rows {
            spans.push(ChunkSpan {
                index: row.try_get("chunk_index")?,
                offset: row.try_get("start_offset")?,
                length: row.try_get("length")?,
            });
        }
        Ok(spans)
    }
}
