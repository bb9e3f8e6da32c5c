//! Private flat file namespaces for engines.
//!
//! An engine's namespace is a flat key-value store: keys are bare file names,
//! there are no directories and no permissions. [`DirNamespace`] backs it
//! with a temporary directory (for engines that need real files);
//! [`MemoryNamespace`] keeps entries in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::{Error, Result};

/// Check that `name` is a usable flat namespace key.
///
/// Rejects empty names, `.`/`..`, path separators, and NUL bytes.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::invalid_path(name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// DirNamespace
// ---------------------------------------------------------------------------

/// Namespace backed by a private temporary directory.
///
/// The directory and everything left in it are removed when the namespace is
/// dropped.
#[derive(Debug)]
pub struct DirNamespace {
    dir: TempDir,
}

impl DirNamespace {
    /// Allocate a fresh private directory.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("transforge-").tempdir()?;
        Ok(Self { dir })
    }

    /// Host directory holding the entries. Engines run with this as their
    /// working directory so flat names resolve inside it.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Host path for an entry.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.path().join(name))
    }

    /// Store `data` under `name`.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// Read the entry `name`.
    pub async fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.resolve(name)?;
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the entry `name`.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all entries currently present.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.dir.path())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// MemoryNamespace
// ---------------------------------------------------------------------------

/// In-memory namespace with an optional byte budget.
#[derive(Debug, Default)]
pub struct MemoryNamespace {
    entries: Mutex<HashMap<String, Bytes>>,
    capacity: Option<u64>,
}

impl MemoryNamespace {
    /// Unbounded namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace that refuses writes once `bytes` are stored.
    pub fn with_capacity(bytes: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: Some(bytes),
        }
    }

    /// Store `data` under `name`.
    pub fn write(&self, name: &str, data: Bytes) -> Result<()> {
        validate_name(name)?;
        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity {
            let used: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != name)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let available = capacity.saturating_sub(used);
            if data.len() as u64 > available {
                return Err(Error::NamespaceFull {
                    needed: data.len() as u64,
                    available,
                });
            }
        }
        entries.insert(name.to_string(), data);
        Ok(())
    }

    /// Read the entry `name`.
    pub fn read(&self, name: &str) -> Result<Bytes> {
        validate_name(name)?;
        self.entries
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }

    /// Remove the entry `name`.
    pub fn remove(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.entries
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(name))
    }

    /// Whether an entry exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Names of all entries currently present.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
