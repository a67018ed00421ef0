use std::cmp::Ordering;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::StudioError;
use crate::types::{DataUrl, HistoryItem, OperationType};

pub const HISTORY_SCHEMA_VERSION: u64 = 1;
pub const HISTORY_FILE_NAME: &str = "history.json";

#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    schema_version: u64,
    #[serde(default)]
    items: Vec<HistoryItem>,
}

/// Durable archive of generation results, keyed by `HistoryItem::id`.
///
/// Nothing is cached: every call reads the file, so several sessions can share
/// one archive. Mutations re-read, change one record and rewrite the file
/// atomically while holding `history.json.lock`. A file that cannot be parsed
/// is left untouched: listing degrades to an empty archive and mutations fail.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add(&self, item: HistoryItem) -> Result<(), StudioError> {
        let id = item.id.clone();
        self.update(|items| {
            if items.contains_key(&item.id) {
                return Err(StudioError::store(format!(
                    "history item '{}' already exists",
                    item.id
                )));
            }
            items.insert(item.id.clone(), item);
            Ok(true)
        })?;
        tracing::debug!(id = %id, "history item added");
        Ok(())
    }

    /// All items, newest first. Never fails: an unreadable store lists as empty.
    pub fn list_all(&self) -> Vec<HistoryItem> {
        match self.load() {
            Ok(items) => newest_first(items.into_values().collect()),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "history read failed; listing empty archive");
                Vec::new()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<HistoryItem> {
        self.load().ok()?.shift_remove(id)
    }

    /// Deletes by id. Removing an id that is not stored is a no-op.
    pub fn remove(&self, id: &str) -> Result<(), StudioError> {
        let removed = self.update(|items| Ok(items.shift_remove(id).is_some()))?;
        if removed {
            tracing::debug!(id = %id, "history item removed");
        }
        Ok(())
    }

    fn load(&self) -> Result<IndexMap<String, HistoryItem>, StudioError> {
        read_history(&self.path).map_err(|err| {
            StudioError::store(format!(
                "failed to read history at {}: {err:#}",
                self.path.display()
            ))
        })
    }

    /// Applies one change to a fresh copy under the lock. `change` returns
    /// whether anything changed; unchanged archives are not rewritten.
    fn update(
        &self,
        change: impl FnOnce(&mut IndexMap<String, HistoryItem>) -> Result<bool, StudioError>,
    ) -> Result<bool, StudioError> {
        let _lock = StoreLock::acquire(&self.path)?;
        let mut items = self.load()?;
        if !change(&mut items)? {
            return Ok(false);
        }
        write_history(&self.path, &items).map_err(|err| {
            tracing::error!(path = %self.path.display(), error = %err, "history write failed");
            StudioError::store(format!(
                "failed to write history at {}: {err:#}",
                self.path.display()
            ))
        })?;
        Ok(true)
    }
}

/// Exclusive `<file>.lock` marker held for one read-modify-write.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    const ATTEMPTS: u32 = 100;
    const RETRY: Duration = Duration::from_millis(20);
    /// Mutations take milliseconds; an older marker is left over from a crash.
    const STALE_AFTER: Duration = Duration::from_secs(10);

    fn acquire(target: &Path) -> Result<Self, StudioError> {
        let path = target.with_extension("json.lock");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                StudioError::store(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        for _ in 0..Self::ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path) {
                        tracing::warn!(path = %path.display(), "removing stale history lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    thread::sleep(Self::RETRY);
                }
                Err(err) => {
                    return Err(StudioError::store(format!(
                        "failed to lock {}: {err}",
                        path.display()
                    )))
                }
            }
        }
        Err(StudioError::store(format!(
            "history is busy in another session ({} is held)",
            path.display()
        )))
    }

    fn is_stale(path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > Self::STALE_AFTER)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Writes the stored image as `sentient-<type>-<millis>.<ext>` under `dir`.
pub fn export_item_image(item: &HistoryItem, dir: &Path) -> Result<PathBuf, StudioError> {
    export_image(item.operation, &item.decode_image()?, dir)
}

/// Writes an image under the export naming scheme without a stored item.
pub fn export_image(
    operation: OperationType,
    image: &DataUrl,
    dir: &Path,
) -> Result<PathBuf, StudioError> {
    fs::create_dir_all(dir)
        .map_err(|err| StudioError::store(format!("failed to create {}: {err}", dir.display())))?;
    let stem = format!(
        "sentient-{}-{}",
        operation.as_str(),
        Utc::now().timestamp_millis()
    );
    let ext = image.extension();
    let mut target = dir.join(format!("{stem}.{ext}"));
    let mut suffix = 1;
    while target.exists() {
        target = dir.join(format!("{stem}-{suffix}.{ext}"));
        suffix += 1;
    }
    fs::write(&target, &image.bytes)
        .map_err(|err| StudioError::store(format!("failed to write {}: {err}", target.display())))?;
    Ok(target)
}

fn newest_first(mut items: Vec<HistoryItem>) -> Vec<HistoryItem> {
    // Stable sort keeps insertion order for equal timestamps.
    items.sort_by(|left, right| {
        match (left.parsed_timestamp(), right.parsed_timestamp()) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    items
}

fn read_history(path: &Path) -> anyhow::Result<IndexMap<String, HistoryItem>> {
    if !path.exists() {
        return Ok(IndexMap::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(IndexMap::new());
    }
    let parsed: HistoryFile = serde_json::from_str(&raw)?;
    if parsed.schema_version != HISTORY_SCHEMA_VERSION {
        anyhow::bail!(
            "unsupported history schema version {}",
            parsed.schema_version
        );
    }
    let mut items = IndexMap::new();
    for item in parsed.items {
        items.entry(item.id.clone()).or_insert(item);
    }
    Ok(items)
}

fn write_history(path: &Path, items: &IndexMap<String, HistoryItem>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = HistoryFile {
        schema_version: HISTORY_SCHEMA_VERSION,
        items: items.values().cloned().collect(),
    };
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(&payload)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
