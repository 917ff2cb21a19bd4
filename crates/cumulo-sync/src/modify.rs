//! The modify workflow: rename / move / trash / restore / content update
//!
//! A compound operation dispatched by which fields of the request changed.
//! Position changes (name, parent) resolve first, possibly through the
//! trash or restore protocols, and a content change follows: a plain
//! upload for regular files, or a recursive bundle reconciliation for
//! directories the host treats as opaque documents.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use cumulo_core::domain::{ItemId, ItemRecord, ItemStatus, RemoteUrl};
use cumulo_core::ports::{EnumerateDepth, RemoteEntry, RemoteError};
use cumulo_store::ChunkSpan;

use crate::error::OperationError;
use crate::lifecycle::{entry_matches_record, ItemOperations};

/// Requested changes to one item
///
/// Unset fields mean "leave as is". `new_content` points at the local
/// materialization of the new content: a file for regular items, a
/// directory tree for bundles.
#[derive(Debug, Clone, Default)]
pub struct ModifyRequest {
    pub new_name: Option<String>,
    pub new_parent: Option<RemoteUrl>,
    pub new_content: Option<PathBuf>,
}

/// One node of a local bundle enumeration
struct LocalNode {
    rel: String,
    directory: bool,
    size: i64,
    modified: Option<DateTime<Utc>>,
    abs: PathBuf,
}

impl ItemOperations {
    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Applies a compound modification to an item
    ///
    /// Dispatch rules:
    /// - already trashed, no filename change requested → no-op success;
    /// - destination parent is the trash bin → optional pre-trash rename,
    ///   then the trash protocol (capability-gated);
    /// - moving away from the trash while trashed → restore, then any
    ///   remaining rename/move;
    /// - any other name/parent change → remote move;
    /// - content change → upload (files) or bundle reconciliation
    ///   (directories).
    pub async fn modify_item(
        &self,
        item_id: &ItemId,
        request: ModifyRequest,
    ) -> Result<ItemRecord, OperationError> {
        let mut record = self
            .store
            .get(item_id)
            .await?
            .filter(|r| !r.deleted)
            .ok_or(OperationError::NotFound)?;

        let trashed = record.is_trashed(&self.account);
        let wants_rename = request
            .new_name
            .as_deref()
            .is_some_and(|n| n != record.file_name);
        let wants_reparent = request
            .new_parent
            .as_ref()
            .is_some_and(|p| *p != record.server_url);
        let to_trash = request
            .new_parent
            .as_ref()
            .is_some_and(|p| self.account.is_trashed_url(p));

        if wants_rename || wants_reparent {
            record = if trashed && !to_trash && wants_reparent {
                // Leaving the trash: restore, then settle any remaining
                // rename/move against the restored location.
                let restored = self.restore_item(item_id).await?;
                let parent = request
                    .new_parent
                    .clone()
                    .unwrap_or_else(|| restored.server_url.clone());
                let name = request
                    .new_name
                    .clone()
                    .unwrap_or_else(|| restored.file_name.clone());
                if parent != restored.server_url || name != restored.file_name {
                    self.move_item(item_id, &parent, Some(&name)).await?
                } else {
                    restored
                }
            } else if trashed && !wants_rename {
                // Reshuffling inside the trash with the same name carries
                // no information; report success without touching anything.
                debug!(item_id = %item_id, "No-op modify of trashed item");
                record
            } else if to_trash {
                if wants_rename {
                    // Pre-trash rename, so the item enters the trash under
                    // its final name.
                    let parent = record.server_url.clone();
                    let name = request.new_name.clone().unwrap_or_default();
                    self.move_item(item_id, &parent, Some(&name)).await?;
                }
                self.trash_item(item_id).await?
            } else {
                let parent = request
                    .new_parent
                    .clone()
                    .unwrap_or_else(|| record.server_url.clone());
                let name = request
                    .new_name
                    .clone()
                    .unwrap_or_else(|| record.file_name.clone());
                self.move_item(item_id, &parent, Some(&name)).await?
            };
        }

        if let Some(content) = &request.new_content {
            record = if record.directory {
                self.reconcile_bundle(&record, content).await?
            } else {
                self.upload_content(&record, content).await?
            };
        }

        Ok(record)
    }

    // ========================================================================
    // Content upload (regular files)
    // ========================================================================

    /// Uploads new content for a regular file
    ///
    /// Brackets the transfer with status transitions: `Uploading` while in
    /// flight (which assigns the chunk-upload session id), `Normal` on
    /// success, `UploadError` on failure. Collisions are compared against
    /// the server's reported conflicting item before surfacing an error:
    /// a conflict with *ourselves* (a landed retry) counts as success.
    async fn upload_content(
        &self,
        record: &ItemRecord,
        content: &Path,
    ) -> Result<ItemRecord, OperationError> {
        let data = tokio::fs::read(content).await?;
        let url = record.full_url()?;

        let in_flight = self
            .store
            .set_status(&record.item_id, ItemStatus::Uploading)
            .await?
            .ok_or_else(|| OperationError::ItemVanished(record.item_id.to_string()))?;

        let chunked = data.len() as u64 > self.chunk_threshold;
        let result = if chunked {
            if let Some(session) = in_flight.chunk_upload_id {
                let spans = chunk_spans(data.len(), self.chunk_size);
                self.store
                    .record_chunk_session(&session, &record.item_id, &spans)
                    .await?;
            }
            self.remote
                .chunked_upload(&url, data, self.chunk_size)
                .await
        } else {
            self.remote
                .upload(&url, data, Some(&in_flight.etag))
                .await
        };

        let entry = match result {
            Ok(entry) => entry,
            Err(RemoteError::Collision) => match self.conflicting_self(&url, record).await {
                Some(entry) => {
                    debug!(item_id = %record.item_id, "Upload conflict was our own revision");
                    entry
                }
                None => {
                    self.store
                        .set_status(&record.item_id, ItemStatus::UploadError)
                        .await?;
                    return Err(OperationError::AlreadyExists);
                }
            },
            Err(e) => {
                self.store
                    .set_status(&record.item_id, ItemStatus::UploadError)
                    .await?;
                return Err(e.into());
            }
        };

        // Settle back to normal first (clears the chunk session), then
        // write the fresh remote truth.
        self.store
            .set_status(&record.item_id, ItemStatus::Normal)
            .await?;

        let mut updated = entry.into_record(&self.account)?;
        updated.downloaded = true;
        updated.keep_downloaded = record.keep_downloaded;
        updated.visited_directory = record.visited_directory;
        updated.sync_time = Utc::now();
        self.store.upsert(&updated).await?;

        info!(item_id = %record.item_id, bytes = updated.size, chunked, "Uploaded content");
        Ok(updated)
    }

    /// Fetches the conflicting item at `url` and returns it when it is
    /// this record under another revision
    async fn conflicting_self(&self, url: &RemoteUrl, record: &ItemRecord) -> Option<RemoteEntry> {
        match self
            .remote
            .enumerate(url, EnumerateDepth::Target, true)
            .await
        {
            Ok(entries) => entries
                .into_iter()
                .next()
                .filter(|e| entry_matches_record(e, record)),
            Err(_) => None,
        }
    }

    // ========================================================================
    // Bundle reconciliation
    // ========================================================================

    /// Synchronizes a bundle directory's remote subtree with new local
    /// contents
    ///
    /// A miniature recursive sync pass: recursively list the remote
    /// subtree, diff against the local enumeration by relative path,
    /// create missing remote folders, upload new or changed files, delete
    /// remote leftovers, then re-list every touched directory back into
    /// the store. The final re-scan (not the write set) is authoritative,
    /// which keeps the operation tolerant of partial completion.
    async fn reconcile_bundle(
        &self,
        record: &ItemRecord,
        contents: &Path,
    ) -> Result<ItemRecord, OperationError> {
        let bundle_url = record.full_url()?;

        let remote_entries = self
            .remote
            .enumerate(&bundle_url, EnumerateDepth::Infinity, true)
            .await
            .map_err(OperationError::from)?;

        // Remote subtree keyed by path relative to the bundle root.
        let prefix = format!("{}/", bundle_url.as_str());
        let mut remote_map: std::collections::HashMap<String, &RemoteEntry> =
            std::collections::HashMap::new();
        for entry in remote_entries.iter().skip(1) {
            if let Some(rel) = entry.url.strip_prefix(&prefix) {
                remote_map.insert(rel.to_string(), entry);
            }
        }

        let local_nodes = enumerate_local(contents).await?;
        let local_rels: HashSet<&str> = local_nodes.iter().map(|n| n.rel.as_str()).collect();

        let mut touched: HashSet<String> = HashSet::new();
        touched.insert(bundle_url.as_str().to_string());

        // Missing remote directories, parents before children.
        for node in local_nodes.iter().filter(|n| n.directory) {
            if !remote_map.contains_key(node.rel.as_str()) {
                let dir_url = RemoteUrl::new(format!("{}/{}", bundle_url, node.rel))?;
                match self.remote.create_folder(&dir_url).await {
                    Ok(_) | Err(RemoteError::Collision) => {}
                    Err(e) => return Err(e.into()),
                }
                touched.insert(parent_of(&dir_url, &bundle_url));
                touched.insert(dir_url.as_str().to_string());
            }
        }

        // New or changed files.
        for node in local_nodes.iter().filter(|n| !n.directory) {
            let changed = match remote_map.get(node.rel.as_str()) {
                None => true,
                Some(entry) => {
                    entry.size != node.size
                        || match (node.modified, entry.modified_at) {
                            (Some(local), Some(remote)) => local > remote,
                            _ => true,
                        }
                }
            };
            if !changed {
                continue;
            }

            let file_url = RemoteUrl::new(format!("{}/{}", bundle_url, node.rel))?;
            let data = tokio::fs::read(&node.abs).await?;
            if data.len() as u64 > self.chunk_threshold {
                self.remote
                    .chunked_upload(&file_url, data, self.chunk_size)
                    .await
                    .map_err(OperationError::from)?;
            } else {
                self.remote
                    .upload(&file_url, data, None)
                    .await
                    .map_err(OperationError::from)?;
            }
            touched.insert(parent_of(&file_url, &bundle_url));
        }

        // Remote leftovers absent from the new local tree. Sorting keeps
        // ancestors first so a deleted directory covers its subtree.
        let mut extraneous: Vec<&String> = remote_map
            .keys()
            .filter(|rel| !local_rels.contains(rel.as_str()))
            .collect();
        extraneous.sort();

        let mut deleted_prefixes: Vec<String> = Vec::new();
        for rel in extraneous {
            if deleted_prefixes
                .iter()
                .any(|p| rel.starts_with(p.as_str()))
            {
                continue;
            }
            let url = RemoteUrl::new(format!("{}/{}", bundle_url, rel))?;
            match self.remote.delete(&url).await {
                Ok(()) | Err(RemoteError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
            if remote_map[rel].directory {
                deleted_prefixes.push(format!("{rel}/"));
            }
            touched.insert(parent_of(&url, &bundle_url));
        }

        // Re-list every touched directory to resync the final state.
        let mut touched: Vec<String> = touched.into_iter().collect();
        touched.sort();
        for dir in touched {
            let dir_url = RemoteUrl::new(dir)?;
            let listing = match self
                .remote
                .enumerate(&dir_url, EnumerateDepth::Children, true)
                .await
            {
                Ok(entries) => entries,
                Err(RemoteError::NotFound) => {
                    warn!(dir = %dir_url, "Touched directory vanished before resync");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut fresh = Vec::with_capacity(listing.len());
            for entry in &listing {
                fresh.push(entry.into_record(&self.account)?);
            }
            self.store
                .reconcile_directory_listing(&self.account, &dir_url, fresh, false)
                .await?;
        }

        let updated = self
            .store
            .get(&record.item_id)
            .await?
            .ok_or_else(|| OperationError::ItemVanished(record.item_id.to_string()))?;

        info!(item_id = %record.item_id, "Reconciled bundle contents");
        Ok(updated)
    }
}

/// Parent directory URL of `url`, never escaping above the bundle root
fn parent_of(url: &RemoteUrl, bundle_root: &RemoteUrl) -> String {
    match url.parent_and_name() {
        Some((parent, _)) if *bundle_root == parent || bundle_root.is_ancestor_of(&parent) => {
            parent.as_str().to_string()
        }
        _ => bundle_root.as_str().to_string(),
    }
}

/// Splits `total` bytes into the chunk layout used by a chunked upload
fn chunk_spans(total: usize, chunk_size: usize) -> Vec<ChunkSpan> {
    let mut spans = Vec::new();
    let mut offset = 0usize;
    let mut index = 0i64;
    while offset < total {
        let length = chunk_size.min(total - offset);
        spans.push(ChunkSpan {
            index,
            offset: offset as i64,
            length: length as i64,
        });
        offset += length;
        index += 1;
    }
    spans
}

/// Walks a local directory tree, returning nodes sorted by relative path
/// (parents before children)
async fn enumerate_local(root: &Path) -> Result<Vec<LocalNode>, std::io::Error> {
    let mut nodes = Vec::new();
    let mut pending: Vec<PathBuf> = vec![PathBuf::new()];

    while let Some(rel_dir) = pending.pop() {
        let abs_dir = root.join(&rel_dir);
        let mut entries = tokio::fs::read_dir(&abs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            let rel_path = rel_dir.join(entry.file_name());
            let rel = rel_path.to_string_lossy().replace('\\', "/");
            if meta.is_dir() {
                pending.push(rel_path.clone());
                nodes.push(LocalNode {
                    rel,
                    directory: true,
                    size: 0,
                    modified: None,
                    abs: entry.path(),
                });
            } else {
                nodes.push(LocalNode {
                    rel,
                    directory: false,
                    size: meta.len() as i64,
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    abs: entry.path(),
                });
            }
        }
    }

    nodes.sort_by(|a, b| a.rel.cmp(&b.rel));
    Ok(nodes)
}
