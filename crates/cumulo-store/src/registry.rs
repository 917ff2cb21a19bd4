//! Per-account store registry
//!
//! Each account owns one metadata database, addressed by a stable on-disk
//! identifier derived from the account id. The registry creates stores on
//! first use, hands out shared instances, and tears them down explicitly,
//! replacing the ambient per-process singletons of earlier designs.
//!
//! A one-time migration path consolidates the legacy shared single-store
//! format (`cumulo.db`, all accounts in one file) into per-account stores,
//! keyed by matching the account column and carrying over chunk-upload
//! session rows.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;

use cumulo_core::domain::Account;

use crate::pool::DatabasePool;
use crate::store::{record_from_row, ItemStore};
use crate::StoreError;

/// File name of the legacy shared single-store database
const LEGACY_DB_FILE: &str = "cumulo.db";

/// Registry of per-account [`ItemStore`] instances
pub struct StoreRegistry {
    data_dir: PathBuf,
    stores: Mutex<HashMap<String, Arc<ItemStore>>>,
}

impl StoreRegistry {
    /// Creates a registry rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Stable database path for an account
    ///
    /// The file name hashes the account id so that arbitrary user names
    /// and hosts cannot produce unsafe filesystem paths.
    pub fn database_path(&self, account: &Account) -> PathBuf {
        let digest = Sha256::digest(account.id().as_bytes());
        let hex = format!("{digest:x}");
        self.data_dir.join(format!("store-{}.db", &hex[..16]))
    }

    /// Returns the store for `account`, creating it on first use
    ///
    /// Creation runs the legacy consolidation before the store is handed
    /// out, so callers never observe a half-migrated database.
    pub async fn store_for(&self, account: &Account) -> Result<Arc<ItemStore>, StoreError> {
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(&account.id()) {
            return Ok(Arc::clone(store));
        }

        let path = self.database_path(account);
        let pool = DatabasePool::new(&path).await?;
        let store = Arc::new(ItemStore::new(pool.pool().clone()));

        migrate_legacy(&self.data_dir, account, &store).await?;

        stores.insert(account.id(), Arc::clone(&store));
        tracing::info!(account = %account.id(), path = %path.display(), "Opened account store");
        Ok(store)
    }

    /// Closes and forgets the store for `account`
    pub async fn teardown(&self, account: &Account) {
        let removed = self.stores.lock().await.remove(&account.id());
        if let Some(store) = removed {
            store.pool().close().await;
            tracing::info!(account = %account.id(), "Closed account store");
        }
    }

    /// Closes every open store
    pub async fn teardown_all(&self) {
        let mut stores = self.stores.lock().await;
        for (account, store) in stores.drain() {
            store.pool().close().await;
            tracing::debug!(%account, "Closed account store");
        }
    }
}

/// Consolidates rows for `account` out of the legacy shared database
///
/// Copies matching item rows and their chunk-session rows into the
/// per-account store, deletes them from the legacy file, and renames the
/// legacy file aside once the last account has been drained. A legacy file
/// with an unreadable schema is left untouched and logged.
async fn migrate_legacy(
    data_dir: &Path,
    account: &Account,
    store: &ItemStore,
) -> Result<(), StoreError> {
    let legacy_path = data_dir.join(LEGACY_DB_FILE);
    if !legacy_path.exists() {
        return Ok(());
    }

    let options = SqliteConnectOptions::new()
        .filename(&legacy_path)
        .create_if_missing(false);
    let legacy = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::ConnectionFailed(format!("legacy database: {e}")))?;

    let rows = match sqlx::query("SELECT * FROM items WHERE account = ?")
        .bind(account.id())
        .fetch_all(&legacy)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "Legacy database has no readable items table, skipping");
            legacy.close().await;
            return Ok(());
        }
    };

    if rows.is_empty() {
        finish_legacy(&legacy, &legacy_path).await;
        return Ok(());
    }

    let mut migrated = 0usize;
    for row in &rows {
        let record = record_from_row(row)?;
        store.upsert(&record).await?;
        migrated += 1;
    }

    let chunk_rows = sqlx::query(
        "SELECT cs.session_id, cs.item_id, cs.chunk_index, cs.start_offset, cs.length \
         FROM chunk_sessions cs JOIN items i ON i.item_id = cs.item_id \
         WHERE i.account = ?",
    )
    .bind(account.id())
    .fetch_all(&legacy)
    .await
    .unwrap_or_default();

    for row in &chunk_rows {
        sqlx::query(
            "INSERT OR REPLACE INTO chunk_sessions \
             (session_id, item_id, chunk_index, start_offset, length) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(row.try_get::<String, _>("session_id")?)
        .bind(row.try_get::<String, _>("item_id")?)
        .bind(row.try_get::<i64, _>("chunk_index")?)
        .bind(row.try_get::<i64, _>("start_offset")?)
        .bind(row.try_get::<i64, _>("length")?)
        .execute(store.pool())
        .await?;
    }

    sqlx::query(
        "DELETE FROM chunk_sessions WHERE item_id IN \
         (SELECT item_id FROM items WHERE account = ?)",
    )
    .bind(account.id())
    .execute(&legacy)
    .await?;
    sqlx::query("DELETE FROM items WHERE account = ?")
        .bind(account.id())
        .execute(&legacy)
        .await?;

    tracing::info!(
        account = %account.id(),
        items = migrated,
        chunks = chunk_rows.len(),
        "Migrated legacy store rows"
    );

    finish_legacy(&legacy, &legacy_path).await;
    Ok(())
}

/// Renames the legacy file aside when no account rows remain
async fn finish_legacy(legacy: &sqlx::SqlitePool, legacy_path: &Path) {
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(legacy)
        .await
        .unwrap_or(i64::MAX);
    legacy.close().await;

    if remaining == 0 {
        let aside = legacy_path.with_extension("db.migrated");
        if let Err(e) = std::fs::rename(legacy_path, &aside) {
            tracing::warn!(error = %e, "Could not rename drained legacy database aside");
        } else {
            tracing::info!(path = %aside.display(), "Legacy database fully drained");
        }
    }
}
