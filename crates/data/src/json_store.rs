use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Atomic JSON document storage.
///
/// Every save serializes to a temp file in the same directory and renames it
/// over the target, so readers either see the previous document or the new
/// one, never a torn write. Used for the ledger state blobs
/// (`virtual_balance`, `auto_trading_status`, `futures_account`, `positions`,
/// `futures_settings`) and the online-classifier checkpoints.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Opens (creating if missing) the document directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create state dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Writes a document atomically (write temp, then rename).
    ///
    /// # Errors
    /// Returns an error if serialization or the filesystem operations fail;
    /// the previous document is left intact in that case.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let body = serde_json::to_vec_pretty(value).context("failed to serialize document")?;
        let target = self.path(name);
        let tmp = self.dir.join(format!("{name}.json.tmp"));
        fs::write(&tmp, body)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &target)
            .with_context(|| format!("failed to rename into {}", target.display()))?;
        Ok(())
    }

    /// Loads a document, returning `None` when it does not exist.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let target = self.path(name);
        if !target.exists() {
            return Ok(None);
        }
        let body = fs::read(&target)
            .with_context(|| format!("failed to read {}", target.display()))?;
        let value = serde_json::from_slice(&body)
            .with_context(|| format!("failed to parse {}", target.display()))?;
        Ok(Some(value))
    }

    /// Loads a document, falling back to `None` on any error. Used for
    /// checkpoints where a corrupt file downgrades to a cold start.
    #[must_use]
    pub fn load_or_none<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        match self.load(name) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("discarding unreadable document {name}: {e:#}");
                None
            }
        }
    }

    /// Removes a document if present.
    ///
    /// # Errors
    /// Returns an error if the removal fails for a reason other than the
    /// file being absent.
    pub fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
