use crate::error::{Result, SyncError};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Synchronous string key-value persistence, the shape of browser `localStorage`
pub trait StorageMedium: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process medium; contents die with the process
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the map cannot leave it half-written
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageMedium for MemoryMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// JSON object file on disk
///
/// The file is re-read on every access so writes made by another process
/// (or by hand) show up on the next read. Writes go to a temp file that is
/// renamed over the original.
#[derive(Debug, Clone)]
pub struct FileMedium {
    path: PathBuf,
}

impl FileMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let entries = serde_json::from_reader(BufReader::new(file))?;
        Ok(entries)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| SyncError::Config(format!("Invalid storage path: {}", self.path.display())))?;
        let temp_path = self
            .path
            .with_file_name(format!("{}.tmp", file_name.to_string_lossy()));

        tracing::trace!("Saving local preferences to {}", self.path.display());

        let writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(writer, entries)?;

        // Atomic rename
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl StorageMedium for FileMedium {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_medium_basic() {
        let medium = MemoryMedium::new();
        assert_eq!(medium.get_item("k").unwrap(), None);

        medium.set_item("k", "v").unwrap();
        assert_eq!(medium.get_item("k").unwrap().as_deref(), Some("v"));

        medium.remove_item("k").unwrap();
        assert_eq!(medium.get_item("k").unwrap(), None);
    }

    #[test]
    fn test_file_medium_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let medium = FileMedium::new(temp.path().join("prefs.json"));

        assert_eq!(medium.get_item("anything").unwrap(), None);
        // Removing from a missing file must not create it
        medium.remove_item("anything").unwrap();
        assert!(!medium.path().exists());
    }

    #[test]
    fn test_file_medium_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("prefs.json");

        FileMedium::new(&path).set_item("a", "1").unwrap();
        FileMedium::new(&path).set_item("b", "2").unwrap();

        let reopened = FileMedium::new(&path);
        assert_eq!(reopened.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get_item("b").unwrap().as_deref(), Some("2"));
        assert!(!path.with_file_name("prefs.json.tmp").exists());
    }

    #[test]
    fn test_file_medium_sees_external_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prefs.json");
        let medium = FileMedium::new(&path);
        medium.set_item("a", "1").unwrap();

        std::fs::write(&path, r#"{"a":"changed"}"#).unwrap();
        assert_eq!(medium.get_item("a").unwrap().as_deref(), Some("changed"));
    }

    #[test]
    fn test_file_medium_corrupted_file_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        let medium = FileMedium::new(&path);
        assert!(matches!(
            medium.get_item("a"),
            Err(SyncError::Serialization(_))
        ));
    }
}
