//! Generic atomic JSON file persistence (C1).
//!
//! Grounded on `original_source/ctm/lib/agents.py::Agent.save`/`get_agent`:
//! write to a temp file in the same directory, read it back and confirm the
//! id round-trips, then rename over the destination; on any failure the temp
//! file is removed and the error propagates. This generalizes that
//! copy-pasted block (repeated for `Agent` and `AgentIndex` in the original)
//! into one routine usable for every on-disk document in this crate.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{CtmError, Result};

/// Write `value` to `path` atomically: serialize to a sibling temp file,
/// read it back to confirm it parses and that `id_of(&parsed) == expected_id`
/// (when `expected_id` is given), then rename into place.
pub fn save_atomic<T: Serialize + DeserializeOwned>(
    path: &Path,
    value: &T,
    expected_id: Option<&str>,
    id_of: impl Fn(&T) -> String,
) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let tmp_name = format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("store"),
        std::process::id()
    );
    let tmp_path = dir.join(tmp_name);

    let result = (|| -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        {
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }

        let raw = std::fs::read_to_string(&tmp_path)?;
        let parsed: T = serde_json::from_str(&raw)?;
        if let Some(expected) = expected_id {
            let actual = id_of(&parsed);
            if actual != expected {
                return Err(CtmError::WriteFailed {
                    path: path.display().to_string(),
                    reason: format!("round-trip id mismatch: expected {expected}, got {actual}"),
                });
            }
        }

        std::fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

/// Read and parse a JSON document, mapping I/O and parse failures to
/// `CorruptStore` with the offending path attached.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| CtmError::CorruptStore {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| CtmError::CorruptStore {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub fn exists(path: &Path) -> bool {
    path.is_file()
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Mtime-keyed LRU cache of parsed documents, mirroring
/// `agents.py`'s module-level `_agent_cache`/`_agent_cache_mtime` with
/// `_MAX_CACHE_SIZE = 20` and oldest-first (insertion-order) eviction.
pub struct MtimeCache<T: Clone> {
    capacity: usize,
    entries: HashMap<PathBuf, (SystemTime, T)>,
    order: Vec<PathBuf>,
}

impl<T: Clone> MtimeCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Return the cached value for `path` if present and still fresh
    /// (on-disk mtime unchanged since caching).
    pub fn get_fresh(&self, path: &Path) -> Option<T> {
        let (cached_mtime, value) = self.entries.get(path)?;
        let current = mtime(path)?;
        if current == *cached_mtime {
            Some(value.clone())
        } else {
            None
        }
    }

    pub fn insert(&mut self, path: PathBuf, value: T) {
        let Some(m) = mtime(&path) else { return };
        if !self.entries.contains_key(&path) {
            if self.order.len() >= self.capacity {
                let oldest = self.order.remove(0);
                self.entries.remove(&oldest);
            }
            self.order.push(path.clone());
        }
        self.entries.insert(path, (m, value));
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
        self.order.retain(|p| p != path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
    struct Doc {
        id: String,
        value: i32,
    }

    #[test]
    fn atomic_save_then_load_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        let doc = Doc {
            id: "abc".to_string(),
            value: 42,
        };
        save_atomic(&path, &doc, Some("abc"), |d: &Doc| d.id.clone()).unwrap();
        let loaded: Doc = load(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn atomic_save_rejects_id_mismatch_and_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        let doc = Doc {
            id: "abc".to_string(),
            value: 1,
        };
        let result = save_atomic(&path, &doc, Some("different"), |d: &Doc| d.id.clone());
        assert!(result.is_err());
        assert!(!path.exists());
        let leftover: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(leftover.is_empty(), "temp file should be cleaned up");
    }

    #[test]
    fn load_missing_file_is_corrupt_store() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");
        let err = load::<Doc>(&path).unwrap_err();
        assert!(matches!(err, CtmError::CorruptStore { .. }));
    }

    #[test]
    fn mtime_cache_evicts_oldest_beyond_capacity() {
        let tmp = TempDir::new().unwrap();
        let mut cache: MtimeCache<i32> = MtimeCache::new(2);
        let p1 = tmp.path().join("a.json");
        let p2 = tmp.path().join("b.json");
        let p3 = tmp.path().join("c.json");
        std::fs::write(&p1, "1").unwrap();
        std::fs::write(&p2, "2").unwrap();
        std::fs::write(&p3, "3").unwrap();

        cache.insert(p1.clone(), 1);
        cache.insert(p2.clone(), 2);
        cache.insert(p3.clone(), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get_fresh(&p1).is_none());
        assert!(cache.get_fresh(&p2).is_some());
        assert!(cache.get_fresh(&p3).is_some());
    }

    #[test]
    fn mtime_cache_invalidates_on_file_change() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.json");
        std::fs::write(&path, "1").unwrap();
        let mut cache: MtimeCache<i32> = MtimeCache::new(5);
        cache.insert(path.clone(), 1);
        assert_eq!(cache.get_fresh(&path), Some(1));

        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&path, "2").unwrap();
        assert!(cache.get_fresh(&path).is_none());
    }
}
