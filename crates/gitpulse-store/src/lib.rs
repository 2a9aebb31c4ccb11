use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use tracing::debug;

use gitpulse_core::MemoryStore;

/// Atomic write: write to temp file in same dir, then rename.
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// File-based exclusive lock guard.
pub struct LockGuard {
    _file: fs::File,
}

/// Acquire an exclusive file lock. Creates the lock file if needed.
pub fn lock_file(path: &Path) -> anyhow::Result<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(LockGuard { _file: file })
}

/// Keyed JSON store: one pretty-printed file per key under `dir`.
///
/// Writes are atomic and serialized through `dir/LOCK`. A successful
/// `memorize` acknowledges with `{"success": true, "campaignId": key}`.
#[derive(Debug, Clone)]
pub struct FileMemoryStore {
    dir: PathBuf,
}

impl FileMemoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Keys currently stored, sorted.
    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn memorize_blocking(&self, key: &str, data: &Value) -> anyhow::Result<Value> {
        let path = self.path_for(key)?;
        let _lock = lock_file(&self.dir.join("LOCK"))?;
        let json = serde_json::to_string_pretty(data)?;
        write_atomic(&path, json.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(key, path = %path.display(), "memorized");
        Ok(serde_json::json!({ "success": true, "campaignId": key }))
    }

    fn recall_blocking(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }
}

fn validate_key(key: &str) -> anyhow::Result<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !key.starts_with('.');
    if !ok {
        anyhow::bail!("invalid store key {key:?}");
    }
    Ok(())
}

// File locking and I/O block, so both run on the blocking pool.
#[async_trait::async_trait]
impl MemoryStore for FileMemoryStore {
    async fn memorize(&self, key: &str, data: &Value) -> anyhow::Result<Value> {
        let store = self.clone();
        let key = key.to_string();
        let data = data.clone();
        tokio::task::spawn_blocking(move || store.memorize_blocking(&key, &data)).await?
    }

    async fn recall(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.recall_blocking(&key)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn write_atomic_creates_missing_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a").join("b").join("test.txt");
        write_atomic(&path, b"hello world").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn lock_file_acquires_and_drops() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("test.lock");
        let guard = lock_file(&lock_path).unwrap();
        assert!(lock_path.exists());
        drop(guard);
    }

    #[test]
    fn rejects_path_like_keys() {
        let store = FileMemoryStore::new("/tmp/unused");
        assert!(store.path_for("acme-widget-1700000000000").is_ok());
        assert!(store.path_for("../escape").is_err());
        assert!(store.path_for("a/b").is_err());
        assert!(store.path_for("").is_err());
    }

    #[tokio::test]
    async fn memorize_then_recall() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileMemoryStore::new(tmp.path().join("memory"));
        let data = serde_json::json!({"campaign": {"totalEmails": 2}});

        let ack = store.memorize("acme-widget-1", &data).await.unwrap();
        assert_eq!(ack["success"], true);
        assert_eq!(ack["campaignId"], "acme-widget-1");

        let back = store.recall("acme-widget-1").await.unwrap().unwrap();
        assert_eq!(back, data);
        assert!(store.recall("missing").await.unwrap().is_none());
        assert_eq!(store.keys().unwrap(), vec!["acme-widget-1".to_string()]);
    }

    #[tokio::test]
    async fn memorize_waits_for_lock_without_stalling_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("memory");
        let store = FileMemoryStore::new(&dir);
        let guard = lock_file(&dir.join("LOCK")).unwrap();

        let pending = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .memorize("acme-widget-2", &serde_json::json!({"ok": 1}))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pending.is_finished());

        drop(guard);
        let ack = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(ack["campaignId"], "acme-widget-2");
    }
}
