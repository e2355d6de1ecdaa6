use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::SessionStore;
use crate::error::{AppError, AppResult};

/// Tab-lifetime store. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.map.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self.map.read().keys().cloned().collect())
    }
}

/// JSON-file backed store. The whole map is cached in memory and the file is
/// rewritten through a temp file and rename on every mutation.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    map: Arc<RwLock<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Open `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
            }
        }
        let map = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(m) => m,
                Err(e) => {
                    warn!(target: "timeclock::storage", "ignoring unreadable session file '{}': {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_err(&path, e)),
        };
        debug!(target: "timeclock::storage", "opened session file '{}' entries={}", path.display(), map.len());
        Ok(Self { path, map: Arc::new(RwLock::new(map)) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn flush(&self, map: &BTreeMap<String, String>) -> AppResult<()> {
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| AppError::storage("storage_encode".to_string(), e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

fn io_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::storage("storage_io".to_string(), format!("{}: {}", path.display(), e))
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut w = self.map.write();
        w.insert(key.to_string(), value.to_string());
        self.flush(&w)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut w = self.map.write();
        if w.remove(key).is_some() {
            self.flush(&w)?;
        }
        Ok(())
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self.map.read().keys().cloned().collect())
    }
}
