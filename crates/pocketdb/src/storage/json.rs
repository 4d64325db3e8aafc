//! JSON file backend
//!
//! File layout:
//! - `<path>`: the snapshot as one JSON object, `{table: {doc_id: {...}}}`
//! - `.<name>.tmp`: scratch file used during a write, renamed over `<path>`

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, trace};

use super::{Snapshot, Storage};
use crate::error::{Error, Result};

/// Options for [`JsonStorage::open`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JsonStorageOptions {
    /// Create missing parent directories
    pub create_dirs: bool,
    /// Refuse writes; the file must already exist
    pub read_only: bool,
    /// Indent the JSON output
    pub pretty: bool,
}

/// Persists the snapshot as a JSON document on disk
#[derive(Debug)]
pub struct JsonStorage {
    /// Path to the JSON file
    path: PathBuf,

    /// Scratch file for atomic replacement
    tmp_path: PathBuf,

    options: JsonStorageOptions,

    /// Is the storage closed?
    closed: bool,
}

impl JsonStorage {
    /// Open or create a JSON storage file
    ///
    /// # Arguments
    /// * `path` - Path of the JSON file
    /// * `options` - Directory creation, access mode and formatting
    ///
    /// # Returns
    /// * `Result<JsonStorage>` - Storage handle
    pub fn open<P: AsRef<Path>>(path: P, options: JsonStorageOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if options.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        if options.read_only {
            // Fail early if there is nothing to read
            File::open(&path)?;
        } else {
            // Touch the file so later reads see an empty document
            OpenOptions::new().create(true).append(true).open(&path)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "db.json".to_string());
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

        debug!(path = %path.display(), read_only = options.read_only, "opened JSON storage");

        Ok(JsonStorage {
            path,
            tmp_path,
            options,
            closed: false,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the storage has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn encode(&self, data: &Snapshot) -> Result<Vec<u8>> {
        let encoded = if self.options.pretty {
            serde_json::to_vec_pretty(data)
        } else {
            serde_json::to_vec(data)
        };
        encoded.map_err(|e| Error::Io(e.into()))
    }

    fn replace_file(&self, bytes: &[u8]) -> Result<()> {
        let mut tmp = File::create(&self.tmp_path)?;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }
}

impl Storage for JsonStorage {
    fn read(&mut self) -> Result<Option<Snapshot>> {
        if self.closed {
            return Err(Error::Closed);
        }

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        trace!(path = %self.path.display(), tables = snapshot.len(), "read snapshot");
        Ok(Some(snapshot))
    }

    fn write(&mut self, data: &Snapshot) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.options.read_only {
            return Err(Error::ReadOnly);
        }

        let bytes = self.encode(data)?;
        if let Err(e) = self.replace_file(&bytes) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(e);
        }

        trace!(path = %self.path.display(), bytes = bytes.len(), "wrote snapshot");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        debug!(path = %self.path.display(), "closed JSON storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocId, Fields};
    use serde_json::json;
    use tempfile::TempDir;

    fn snapshot() -> Snapshot {
        let mut doc = Fields::new();
        doc.insert("name".into(), json!("Ada"));
        doc.insert("score".into(), json!(9.5));

        let mut snapshot = Snapshot::new();
        let table = snapshot.entry("users".into()).or_default();
        table.insert(DocId(1), doc.clone());
        table.insert(DocId(10), doc);
        snapshot.insert("empty".into(), Default::default());
        snapshot
    }

    #[test]
    fn test_create_and_read_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let mut storage = JsonStorage::open(&path, JsonStorageOptions::default()).unwrap();

        assert!(path.exists());
        assert_eq!(storage.read().unwrap(), None);
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let mut storage =
            JsonStorage::open(dir.path().join("db.json"), JsonStorageOptions::default()).unwrap();

        storage.write(&snapshot()).unwrap();
        assert_eq!(storage.read().unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_ids_are_json_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let mut storage = JsonStorage::open(&path, JsonStorageOptions::default()).unwrap();

        storage.write(&snapshot()).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["users"]["10"]["name"], "Ada");
        assert_eq!(raw["empty"], json!({}));
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        {
            let mut storage = JsonStorage::open(&path, JsonStorageOptions::default()).unwrap();
            storage.write(&snapshot()).unwrap();
            storage.close().unwrap();
        }

        {
            let mut storage = JsonStorage::open(&path, JsonStorageOptions::default()).unwrap();
            assert_eq!(storage.read().unwrap(), Some(snapshot()));
        }
    }

    #[test]
    fn test_pretty_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let options = JsonStorageOptions {
            pretty: true,
            ..Default::default()
        };
        let mut storage = JsonStorage::open(&path, options).unwrap();

        storage.write(&snapshot()).unwrap();

        assert!(fs::read_to_string(&path).unwrap().contains('\n'));
        assert_eq!(storage.read().unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        let mut storage = JsonStorage::open(&path, JsonStorageOptions::default()).unwrap();
        assert!(matches!(storage.read(), Err(Error::Decode(_))));

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(storage.read(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_create_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/db.json");

        assert!(JsonStorage::open(&path, JsonStorageOptions::default()).is_err());

        let options = JsonStorageOptions {
            create_dirs: true,
            ..Default::default()
        };
        JsonStorage::open(&path, options).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_read_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let read_only = JsonStorageOptions {
            read_only: true,
            ..Default::default()
        };

        assert!(matches!(JsonStorage::open(&path, read_only), Err(Error::Io(_))));

        JsonStorage::open(&path, JsonStorageOptions::default())
            .unwrap()
            .write(&snapshot())
            .unwrap();

        let mut storage = JsonStorage::open(&path, read_only).unwrap();
        assert_eq!(storage.read().unwrap(), Some(snapshot()));
        assert!(matches!(storage.write(&Snapshot::new()), Err(Error::ReadOnly)));
        assert_eq!(storage.read().unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_close_twice() {
        let dir = TempDir::new().unwrap();
        let mut storage =
            JsonStorage::open(dir.path().join("db.json"), JsonStorageOptions::default()).unwrap();

        storage.close().unwrap();
        storage.close().unwrap();
        assert!(storage.is_closed());
    }

    #[test]
    fn test_use_after_close() {
        let dir = TempDir::new().unwrap();
        let mut storage =
            JsonStorage::open(dir.path().join("db.json"), JsonStorageOptions::default()).unwrap();

        storage.close().unwrap();

        assert!(matches!(storage.read(), Err(Error::Closed)));
        assert!(matches!(storage.write(&snapshot()), Err(Error::Closed)));
    }
}
