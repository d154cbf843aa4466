//! File-backed store: one encoded record in one file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use latchkey_protocol::{Codec, JsonCodec, Properties};

use crate::{Store, StoreError};

/// A [`Store`] that keeps the record in a single file.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves either the old record or the new one, never
/// half of each. Nothing else is watched: this store never emits external
/// change notifications.
#[derive(Debug, Clone)]
pub struct FileStore<C: Codec = JsonCodec> {
    path: PathBuf,
    codec: C,
}

impl FileStore {
    /// Creates a JSON-encoded store at `path`. The file is created on the
    /// first `persist`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_codec(path, JsonCodec)
    }
}

impl<C: Codec> FileStore<C> {
    /// Creates a store at `path` using a custom codec.
    pub fn with_codec(path: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            path: path.into(),
            codec,
        }
    }

    /// Where the record lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<C: Codec> Store for FileStore<C> {
    fn persist(&self, data: &Properties) -> Result<(), StoreError> {
        let bytes = self.codec.encode(data)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
            }
        }

        let temp = self.temp_path();
        std::fs::write(&temp, bytes).map_err(StoreError::Write)?;
        std::fs::rename(&temp, &self.path).map_err(StoreError::Write)?;

        tracing::trace!(path = %self.path.display(), "file store persisted");
        Ok(())
    }

    fn restore(&self) -> Result<Properties, StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(self.codec.decode(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Properties::new()),
            Err(e) => Err(StoreError::Read(e)),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::trace!(path = %self.path.display(), "file store cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Remove(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> Properties {
        value.as_object().cloned().expect("test records are objects")
    }

    #[test]
    fn test_restore_missing_file_returns_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));

        assert!(store.restore().unwrap().is_empty());
    }

    #[test]
    fn test_persist_then_restore_survives_new_instance() {
        // A second FileStore on the same path stands in for the next run
        // of the application.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let data = record(json!({ "authenticator": "app::Token", "token": "abc" }));

        FileStore::new(&path).persist(&data).unwrap();

        assert_eq!(FileStore::new(&path).restore().unwrap(), data);
    }

    #[test]
    fn test_persist_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/deeper/session.json"));

        store.persist(&record(json!({ "k": "v" }))).unwrap();

        assert!(store.path().exists());
    }

    #[test]
    fn test_persist_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));

        store.persist(&record(json!({ "k": "v" }))).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);
    }

    #[test]
    fn test_clear_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));
        store.persist(&record(json!({ "k": "v" }))).unwrap();

        store.clear().unwrap();
        store.clear().unwrap();

        assert!(!store.path().exists());
        assert!(store.restore().unwrap().is_empty());
    }

    #[test]
    fn test_restore_corrupt_file_returns_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{ definitely not json").unwrap();

        let result = FileStore::new(&path).restore();

        assert!(matches!(result, Err(StoreError::Codec(_))));
    }

    #[test]
    fn test_file_store_has_no_external_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));

        assert!(store.subscribe().is_none());
    }
}
