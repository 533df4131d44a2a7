//! [libs/core/mapping-store/src/lib.rs]
//! Durable, crash-safe Mapping store (spec §4.5).
//!
//! In memory: a `tag_id -> MappingEntry` table plus a reverse
//! `inventory_spool_id -> tag_id` index for O(1) event dispatch. On disk: a
//! single self-describing JSON document, written through a
//! serialize-to-tempfile / flush+sync / rename sequence so a reader never
//! observes a half-written file (spec §4.5 invariant 4). Mutating calls
//! mark the table dirty and a background task coalesces the resulting
//! writes into one save per 500ms window (spec §4.5's debounce contract).
//!
//! The single `tokio::sync::Mutex` guarding the table *is* the "per-tag
//! lock registry" the SyncState description in spec §3 gestures at: spec
//! §5 resolves that to one mutex over the whole table rather than a lock
//! per tag, and this is where that mutex lives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use spoolbridge_models::MappingEntry;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};

const SCHEMA_VERSION: u32 = 1;
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum MappingStoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mapping document is corrupt: {0}")]
    Corrupt(serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingDocument {
    schema_version: u32,
    entries: HashMap<String, MappingEntry>,
}

struct MappingState {
    entries: HashMap<String, MappingEntry>,
    reverse: HashMap<String, String>,
    dirty: bool,
}

impl MappingState {
    fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            reverse: HashMap::new(),
            dirty: false,
        }
    }

    fn rebuild_reverse_index(&mut self) {
        self.reverse = self
            .entries
            .iter()
            .map(|(tag_id, entry)| (entry.inventory_spool_id.clone(), tag_id.clone()))
            .collect();
    }
}

/// The durable Mapping table.
pub struct MappingStore {
    path: PathBuf,
    state: Mutex<MappingState>,
    dirty_signal: Notify,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(MappingState::empty()),
            dirty_signal: Notify::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted document, replacing the in-memory table.
    /// Returns `Ok(true)` if an existing, parseable file was loaded,
    /// `Ok(false)` if the file is simply absent (first run), and
    /// `Err(Corrupt)` if a file exists but failed to parse — both the
    /// absent and corrupt cases are the "treat as absent" condition spec
    /// §4.5 describes; callers take the recovery path (spec §4.6.1) on
    /// either `Ok(false)` or `Err`.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<bool, MappingStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no mapping file present at startup");
                return Ok(false);
            }
            Err(e) => {
                return Err(MappingStoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let document: MappingDocument = serde_json::from_slice(&bytes).map_err(|e| {
            warn!("mapping file failed to parse, treating as absent: {e}");
            MappingStoreError::Corrupt(e)
        })?;

        let mut state = self.state.lock().await;
        state.entries = document.entries;
        state.rebuild_reverse_index();
        state.dirty = false;
        info!(count = state.entries.len(), "mapping loaded from disk");
        Ok(true)
    }

    /// Replaces the entire table (used by mapping recovery, spec §4.6.1
    /// step 3, when rebuilding from the Inventory catalog) and schedules a
    /// save.
    pub async fn replace_all(&self, entries: HashMap<String, MappingEntry>) {
        let mut state = self.state.lock().await;
        state.entries = entries;
        state.rebuild_reverse_index();
        state.dirty = true;
        drop(state);
        self.dirty_signal.notify_one();
    }

    pub async fn get(&self, tag_id: &str) -> Option<MappingEntry> {
        self.state.lock().await.entries.get(tag_id).cloned()
    }

    pub async fn upsert(&self, tag_id: impl Into<String>, entry: MappingEntry) {
        let tag_id = tag_id.into();
        let mut state = self.state.lock().await;
        state.reverse.insert(entry.inventory_spool_id.clone(), tag_id.clone());
        state.entries.insert(tag_id, entry);
        state.dirty = true;
        drop(state);
        self.dirty_signal.notify_one();
    }

    pub async fn remove(&self, tag_id: &str) -> Option<MappingEntry> {
        let mut state = self.state.lock().await;
        let removed = state.entries.remove(tag_id);
        if let Some(entry) = &removed {
            state.reverse.remove(&entry.inventory_spool_id);
        }
        state.dirty = true;
        drop(state);
        self.dirty_signal.notify_one();
        removed
    }

    /// Looks up the `tag_id` mapped to an Inventory spool id, for
    /// `SpoolDeleted`/`SpoolUpdated` event dispatch (spec §4.6.4).
    pub async fn reverse_lookup(&self, inventory_spool_id: &str) -> Option<String> {
        self.state.lock().await.reverse.get(inventory_spool_id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, MappingEntry> {
        self.state.lock().await.entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serializes the current table and performs the atomic write (spec
    /// §4.5): serialize to a sibling temp file, flush + sync, rename over
    /// the target. Clears the dirty flag on success.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn save_now(&self) -> Result<(), MappingStoreError> {
        let document = {
            let mut state = self.state.lock().await;
            let document = MappingDocument {
                schema_version: SCHEMA_VERSION,
                entries: state.entries.clone(),
            };
            state.dirty = false;
            document
        };

        let json = serde_json::to_vec_pretty(&document).expect("MappingDocument always serializes");

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let suffix: u64 = rand::thread_rng().gen();
        let tmp_path = dir.join(format!(
            ".{}.tmp-{:016x}",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("mapping"),
            suffix
        ));

        {
            let mut file = tokio::fs::File::create(&tmp_path).await.map_err(|e| MappingStoreError::Io {
                path: tmp_path.clone(),
                source: e,
            })?;
            use tokio::io::AsyncWriteExt;
            file.write_all(&json).await.map_err(|e| MappingStoreError::Io {
                path: tmp_path.clone(),
                source: e,
            })?;
            file.sync_all().await.map_err(|e| MappingStoreError::Io {
                path: tmp_path.clone(),
                source: e,
            })?;
        }

        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| MappingStoreError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        debug!("mapping saved");
        Ok(())
    }

    async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }
}

/// Spawns the background debounced saver: coalesces bursts of mutations
/// inside `DEBOUNCE_WINDOW` into one `save_now` call. Runs until the
/// process exits; the Supervisor calls `save_now` directly during shutdown
/// for the final forced save (spec §5 Cancellation), so this task does not
/// need its own shutdown signal.
pub fn spawn_debounced_saver(store: Arc<MappingStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            store.dirty_signal.notified().await;
            tokio::time::sleep(DEBOUNCE_WINDOW).await;
            if !store.is_dirty().await {
                continue;
            }
            if let Err(e) = store.save_now().await {
                warn!("debounced mapping save failed, keeping in-memory state: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn entry(spool_id: &str, remaining: f64) -> MappingEntry {
        MappingEntry::new(spool_id, remaining, Utc::now())
    }

    #[tokio::test]
    async fn load_absent_file_returns_false() {
        let dir = tempdir().unwrap();
        let store = MappingStore::new(dir.path().join("mapping.json"));
        assert_eq!(store.load().await.unwrap(), false);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = MappingStore::new(dir.path().join("mapping.json"));
        store.upsert("A1", entry("spool-1", 975.0)).await;
        store.save_now().await.unwrap();

        let reloaded = MappingStore::new(dir.path().join("mapping.json"));
        assert!(reloaded.load().await.unwrap());
        assert_eq!(reloaded.get("A1").await.unwrap().inventory_spool_id, "spool-1");
    }

    #[tokio::test]
    async fn corrupt_file_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        tokio::fs::write(&path, b"{ not valid json").await.unwrap();
        let store = MappingStore::new(path);
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn save_never_leaves_a_partial_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        let store = MappingStore::new(path.clone());
        store.upsert("A1", entry("spool-1", 500.0)).await;
        store.save_now().await.unwrap();

        // No leftover temp files after a successful save.
        let mut leftovers = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while let Some(ent) = leftovers.next_entry().await.unwrap() {
            if ent.file_name().to_string_lossy().contains(".tmp-") {
                count += 1;
            }
        }
        assert_eq!(count, 0);

        // And the committed file is valid JSON carrying the schema version.
        let bytes = tokio::fs::read(&path).await.unwrap();
        let doc: MappingDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.schema_version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn prior_file_survives_an_interrupted_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        let store = MappingStore::new(path.clone());
        store.upsert("A1", entry("spool-1", 500.0)).await;
        store.save_now().await.unwrap();
        let good_bytes = tokio::fs::read(&path).await.unwrap();

        // Simulate a crash between temp-file write and rename: leave a
        // stray temp file on disk without renaming it over the target.
        let stray_tmp = dir.path().join(".mapping.json.tmp-deadbeef00000000");
        tokio::fs::write(&stray_tmp, b"{garbage, not committed}").await.unwrap();

        let reloaded = MappingStore::new(path.clone());
        assert!(reloaded.load().await.unwrap());
        let bytes_after = tokio::fs::read(&path).await.unwrap();
        assert_eq!(bytes_after, good_bytes);
    }

    #[tokio::test]
    async fn remove_clears_reverse_index() {
        let dir = tempdir().unwrap();
        let store = MappingStore::new(dir.path().join("mapping.json"));
        store.upsert("A1", entry("spool-1", 500.0)).await;
        assert_eq!(store.reverse_lookup("spool-1").await.as_deref(), Some("A1"));
        store.remove("A1").await;
        assert_eq!(store.reverse_lookup("spool-1").await, None);
    }

    #[tokio::test]
    async fn debounced_saver_coalesces_bursts() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MappingStore::new(dir.path().join("mapping.json")));
        let _handle = spawn_debounced_saver(store.clone());

        for i in 0..5 {
            store.upsert(format!("tag-{i}"), entry("spool-x", 100.0)).await;
        }

        tokio::time::sleep(DEBOUNCE_WINDOW + Duration::from_millis(200)).await;
        assert!(store.path().exists());
        let reloaded = MappingStore::new(store.path().to_path_buf());
        assert!(reloaded.load().await.unwrap());
        assert_eq!(reloaded.len().await, 5);
    }
}
