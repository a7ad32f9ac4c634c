//! Hybrid in-memory/on-disk host store
//!
//! Used two ways over the lifetime of a run: first as a de-duplicating set
//! of pending hosts during input materialization, then as a host -> DNS
//! record bundle map during wildcard post-processing, where the whole
//! result set needs random access after resolution has already finished.
//!
//! Small workloads never touch disk: the in-memory `DashMap` tier answers
//! every `put`/`has`/`scan` until its entry count crosses
//! `spill_threshold`, at which point new entries are appended to a JSON
//! Lines overflow file instead. `scan` merges both tiers.

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::ErrorKind;

#[derive(Serialize, Deserialize)]
struct OverflowEntry {
    key: String,
    #[serde(default)]
    value: Vec<u8>,
}

/// A key/value store with set semantics, spilling to disk past a size
/// threshold. Safe for concurrent `put`/`has`/`scan` from multiple tasks.
pub struct HostStore {
    memory: DashMap<String, Vec<u8>>,
    spill_threshold: usize,
    overflow_path: PathBuf,
    overflow_file: Mutex<Option<File>>,
    overflow_keys: DashMap<String, ()>,
    overflow_count: AtomicUsize,
}

impl HostStore {
    /// Creates a store that keeps up to `spill_threshold` entries in memory
    /// before spilling additional `put`s to `overflow_path`.
    pub fn new(spill_threshold: usize, overflow_path: PathBuf) -> Self {
        Self {
            memory: DashMap::new(),
            spill_threshold,
            overflow_path,
            overflow_file: Mutex::new(None),
            overflow_keys: DashMap::new(),
            overflow_count: AtomicUsize::new(0),
        }
    }

    /// A store sized for typical enumeration workloads, overflowing into a
    /// temp-directory file scoped to this process.
    pub fn with_defaults() -> Self {
        let path = std::env::temp_dir().join(format!("swarmdns-{}.jsonl", std::process::id()));
        Self::new(200_000, path)
    }

    pub fn has(&self, key: &str) -> bool {
        self.memory.contains_key(key) || self.overflow_keys.contains_key(key)
    }

    /// Inserts `key` with `value` (possibly empty). Idempotent: re-inserting
    /// an existing key just overwrites its value in whichever tier holds it.
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.overflow_keys.contains_key(key) {
            self.append_overflow(key, &value).await?;
            return Ok(());
        }

        if self.memory.len() < self.spill_threshold {
            self.memory.insert(key.to_string(), value);
            return Ok(());
        }

        self.append_overflow(key, &value).await?;
        Ok(())
    }

    async fn append_overflow(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut guard = self.overflow_file.lock().await;
        if guard.is_none() {
            debug!("Spilling host store to {}", self.overflow_path.display());
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.overflow_path)
                .await
                .context("failed to open host store overflow file")
                .context(ErrorKind::Storage)?;
            *guard = Some(file);
        }
        let file = guard.as_mut().expect("overflow file just initialized");

        let entry = OverflowEntry {
            key: key.to_string(),
            value: value.to_vec(),
        };
        let mut line = serde_json::to_vec(&entry)
            .context("failed to serialize overflow entry")
            .context(ErrorKind::Storage)?;
        line.push(b'\n');
        file.write_all(&line)
            .await
            .context("failed to append to host store overflow file")
            .context(ErrorKind::Storage)?;

        self.overflow_keys.insert(key.to_string(), ());
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Invokes `f` once per key, in arbitrary order, merging the in-memory
    /// and on-disk tiers. A key present in both takes its most recently
    /// written value (the disk tier is append-only, so the last line for a
    /// key wins).
    pub async fn scan<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, &[u8]),
    {
        for entry in self.memory.iter() {
            f(entry.key(), entry.value());
        }

        if self.overflow_count.load(Ordering::Relaxed) == 0 {
            return Ok(());
        }

        let file = match File::open(&self.overflow_path).await {
            Ok(file) => file,
            Err(e) => {
                warn!("failed to read host store overflow file: {}", e);
                return Ok(());
            }
        };

        let mut latest: std::collections::HashMap<String, Vec<u8>> = std::collections::HashMap::new();
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<OverflowEntry>(trimmed) {
                Ok(entry) => {
                    latest.insert(entry.key, entry.value);
                }
                Err(e) => warn!("skipping malformed overflow entry: {}", e),
            }
        }

        for (key, value) in &latest {
            f(key, value);
        }

        Ok(())
    }

    /// Releases the overflow file handle, if one was opened.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.overflow_file.lock().await;
        if let Some(mut file) = guard.take() {
            file.flush()
                .await
                .context("failed to flush overflow file on close")
                .context(ErrorKind::Storage)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.memory.len() + self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedHostStore = Arc<HostStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_and_scan_roundtrip_in_memory() {
        let store = HostStore::new(100, std::env::temp_dir().join("swarmdns-test-1.jsonl"));
        store.put("a.test", b"one".to_vec()).await.unwrap();
        store.put("b.test", b"two".to_vec()).await.unwrap();

        assert!(store.has("a.test"));
        assert!(!store.has("c.test"));

        let mut seen = std::collections::HashMap::new();
        store
            .scan(|k, v| {
                seen.insert(k.to_string(), v.to_vec());
            })
            .await
            .unwrap();

        assert_eq!(seen.get("a.test"), Some(&b"one".to_vec()));
        assert_eq!(seen.get("b.test"), Some(&b"two".to_vec()));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn spills_to_disk_past_threshold() {
        let path = std::env::temp_dir().join(format!("swarmdns-test-spill-{}.jsonl", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;
        let store = HostStore::new(1, path.clone());

        store.put("first", b"1".to_vec()).await.unwrap();
        store.put("second", b"2".to_vec()).await.unwrap();
        store.put("third", b"3".to_vec()).await.unwrap();

        assert!(store.has("second"));
        assert!(store.has("third"));

        let mut seen = std::collections::HashSet::new();
        store
            .scan(|k, _| {
                seen.insert(k.to_string());
            })
            .await
            .unwrap();
        assert_eq!(seen.len(), 3);

        store.close().await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn overflow_failure_is_tagged_as_storage() {
        // A spill path under a nonexistent directory can never be opened,
        // so the first spilling `put` fails with `ErrorKind::Storage`.
        let path = std::env::temp_dir()
            .join("swarmdns-test-missing-dir")
            .join("overflow.jsonl");
        let store = HostStore::new(0, path);
        let err = store.put("a.test", b"one".to_vec()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<ErrorKind>(), Some(&ErrorKind::Storage));
    }

    #[tokio::test]
    async fn idempotent_put_counts_once() {
        let store = HostStore::new(100, std::env::temp_dir().join("swarmdns-test-idempotent.jsonl"));
        store.put("dup.test", vec![]).await.unwrap();
        store.put("dup.test", vec![]).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
