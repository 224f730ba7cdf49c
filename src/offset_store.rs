//! Durable per-file byte-offset map.
//!
//! The whole map lives in one small JSON file and is rewritten from byte 0
//! on every update. There is no delta encoding and no WAL: the map is small
//! (bounded by the number of files in the pool) so a full rewrite is cheap,
//! and it sidesteps the complexity of append-with-compaction.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Crash-consistent `filename -> offset` map, guarded by a single mutex so
/// every caller — the tailing thread and, on the kqueue backend, the
/// directory-poll thread — observes a consistent view.
pub struct OffsetStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, u64>>,
}

impl OffsetStore {
    /// Load the map from `path`, creating an empty file if it doesn't exist.
    ///
    /// An empty or all-whitespace file is treated as an empty map (this is
    /// the state of a freshly created offset file) and only logs a warning.
    /// A non-empty file that fails to parse is fatal: a corrupt offset store
    /// cannot be trusted to avoid re-shipping or skipping a backlog.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            File::create(&path).with_context(|| format!("creating offset file {}", path.display()))?;
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading offset file {}", path.display()))?;
        let map = if contents.trim().is_empty() {
            tracing::warn!(path = %path.display(), "offset file empty, starting with no known offsets");
            HashMap::new()
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("offset file {} is corrupt", path.display()))?
        };
        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    /// Stored offset for `filename`, or 0 if never seen.
    pub fn get(&self, filename: &Path) -> u64 {
        let key = filename.to_string_lossy().to_string();
        let guard = self.inner.lock().expect("offset store mutex poisoned");
        *guard.get(&key).unwrap_or(&0)
    }

    /// Overwrite `filename`'s offset and rewrite the whole file.
    pub fn update(&self, filename: &Path, new_offset: u64) -> Result<()> {
        let key = filename.to_string_lossy().to_string();
        let mut guard = self.inner.lock().expect("offset store mutex poisoned");
        guard.insert(key, new_offset);
        self.flush(&guard)
    }

    /// Zero the offset for each of `filenames` (a file left the pool, or a
    /// new one just entered it) and rewrite the whole file.
    pub fn reset(&self, filenames: &[PathBuf]) -> Result<()> {
        let mut guard = self.inner.lock().expect("offset store mutex poisoned");
        for f in filenames {
            guard.insert(f.to_string_lossy().to_string(), 0);
        }
        self.flush(&guard)
    }

    fn flush(&self, map: &HashMap<String, u64>) -> Result<()> {
        let serialized = serde_json::to_vec(map).context("serializing offset map")?;
        let mut file = File::create(&self.path)
            .with_context(|| format!("rewriting offset file {}", self.path.display()))?;
        file.write_all(&serialized)
            .with_context(|| format!("writing offset file {}", self.path.display()))?;
        Ok(())
    }
}
