//! Key-value persistence for queues and logs.
//!
//! A [`Bucket`] stores JSON values by key. Queues and logs write their
//! state under their own name, as a plain JSON array.

use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait Bucket: Debug + Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<Value>>;

    async fn set_item(&self, key: &str, value: Value) -> Result<()>;

    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every item.
    async fn clear(&self) -> Result<()>;
}

/// Bucket held in process memory.
#[derive(Debug, Default)]
pub struct MemoryBucket {
    items: DashMap<String, Value>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.get(key).map(|entry| entry.value().clone()))
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.items.clear();
        Ok(())
    }
}

/// Bucket storing one JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileBucket {
    dir: PathBuf,
}

impl FileBucket {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys are hex-escaped outside `[A-Za-z0-9_-]` so any key maps to a
    /// distinct, portable file name.
    fn item_path(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> Error {
    Error::Bucket(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl Bucket for FileBucket {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let path = self.item_path(key);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path, err)),
        };
        let value = serde_json::from_slice(&content)
            .map_err(|e| Error::Bucket(format!("{}: {}", path.display(), e)))?;
        Ok(Some(value))
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.item_path(key);
        let content = serde_json::to_vec(&value).map_err(|e| Error::Bucket(e.to_string()))?;

        // Write then rename so readers never see a partial file
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, content)
            .await
            .map_err(|e| io_error(&staging, e))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.item_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&path, err)),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_error(&self.dir, err)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| io_error(&path, e))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_bucket() {
        let bucket = MemoryBucket::new();
        assert_eq!(bucket.get_item("queue").await.unwrap(), None);

        bucket.set_item("queue", json!(["a", "b"])).await.unwrap();
        bucket.set_item("log", json!([])).await.unwrap();
        assert_eq!(bucket.get_item("queue").await.unwrap(), Some(json!(["a", "b"])));
        assert_eq!(bucket.len(), 2);

        bucket.remove_item("queue").await.unwrap();
        assert_eq!(bucket.get_item("queue").await.unwrap(), None);

        bucket.clear().await.unwrap();
        assert!(bucket.is_empty());
    }

    #[tokio::test]
    async fn file_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new(dir.path().join("state"));

        // Nothing has been written yet, not even the directory
        assert_eq!(bucket.get_item("queue").await.unwrap(), None);
        bucket.clear().await.unwrap();
        bucket.remove_item("queue").await.unwrap();

        bucket.set_item("queue", json!([{"type": "t"}])).await.unwrap();
        bucket.set_item("queue", json!([{"type": "u"}])).await.unwrap();
        assert_eq!(
            bucket.get_item("queue").await.unwrap(),
            Some(json!([{"type": "u"}]))
        );

        let reopened = FileBucket::new(bucket.dir());
        assert_eq!(
            reopened.get_item("queue").await.unwrap(),
            Some(json!([{"type": "u"}]))
        );

        reopened.clear().await.unwrap();
        assert_eq!(bucket.get_item("queue").await.unwrap(), None);
    }

    #[test]
    fn file_names_are_escaped() {
        let bucket = FileBucket::new("/data");
        assert_eq!(bucket.item_path("queue_1"), PathBuf::from("/data/queue_1.json"));
        assert_eq!(bucket.item_path("a/b"), PathBuf::from("/data/a%2Fb.json"));
        assert_ne!(bucket.item_path("a.b"), bucket.item_path("a_b"));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FileBucket::new(dir.path());
        std::fs::write(dir.path().join("log.json"), "not json").unwrap();

        let err = bucket.get_item("log").await.unwrap_err();
        assert!(matches!(err, Error::Bucket(_)));
    }
}
