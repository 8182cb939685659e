//! File-backed key/value storage for the generation history.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use maskforge_core::{Storage, StoreError};

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` as the storage root. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Storage root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Backend(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StoreError::Backend(format!("creating {}: {e}", self.dir.display()))
        })?;
        let path = self.path(key);
        std::fs::write(&path, value)
            .map_err(|e| StoreError::Backend(format!("writing {}: {e}", path.display())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "maskforge-storage-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_key_reads_as_none() {
        let storage = FileStorage::new(scratch_dir("missing"));
        assert_eq!(storage.get("banner_generations").unwrap(), None);
    }

    #[test]
    fn set_then_get() {
        let dir = scratch_dir("roundtrip");
        let mut storage = FileStorage::new(&dir);
        storage.set("banner_generations", "[]".into()).unwrap();
        assert_eq!(
            storage.get("banner_generations").unwrap().as_deref(),
            Some("[]")
        );
        assert!(dir.join("banner_generations.json").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
