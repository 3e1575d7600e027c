use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::PersistenceError;

/// Reserved key prefix marking learned selectors inside a context map.
pub const LEARNED_KEY_PREFIX: &str = "popup_close_";

/// Serialized form of the store: `context -> key -> selector`.
///
/// Learned selectors live in the same map under `popup_close_<unix-millis>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeSnapshot {
    pub contexts: BTreeMap<String, BTreeMap<String, String>>,
}

impl KnowledgeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.contexts.values().all(BTreeMap::is_empty)
    }
}

pub trait KnowledgePersistence: Send + Sync {
    fn load(&self) -> Result<KnowledgeSnapshot, PersistenceError>;
    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<(), PersistenceError>;
}

/// Pretty-printed JSON file, replaced atomically on save.
#[derive(Clone, Debug)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl KnowledgePersistence for JsonFilePersistence {
    fn load(&self) -> Result<KnowledgeSnapshot, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(KnowledgeSnapshot::default()),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(KnowledgeSnapshot::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<(), PersistenceError> {
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let json = serde_json::to_vec_pretty(snapshot)?;
        let staging = self.staging_path();
        fs::write(&staging, json).map_err(write_err)?;
        fs::rename(&staging, &self.path).map_err(write_err)
    }
}

/// In-process persistence for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    snapshot: Mutex<KnowledgeSnapshot>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(snapshot: KnowledgeSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Makes every subsequent load and save fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> KnowledgeSnapshot {
        self.snapshot.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Write {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(ErrorKind::Other, "persistence disabled"),
            });
        }
        Ok(())
    }
}

impl KnowledgePersistence for MemoryPersistence {
    fn load(&self) -> Result<KnowledgeSnapshot, PersistenceError> {
        self.check()?;
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &KnowledgeSnapshot) -> Result<(), PersistenceError> {
        self.check()?;
        *self.snapshot.lock() = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
