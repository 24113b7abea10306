//! Disk Storage Module
//!
//! One file per entry below a base directory. Each file starts with a single
//! JSON header line (`key`, `tag`, `secs`, `nanos`) followed by the encoded
//! body, so scans can judge an entry by reading its first line only. The
//! timestamp keeps full nanosecond precision, matching the memory backend.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::KeyConfig;
use crate::error::{CacheError, Result};
use crate::storage::{CacheStorage, Pather, StoredEntry, DEFAULT_PATHER};

const TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    key: String,
    tag: String,
    secs: i64,
    nanos: u32,
}

impl EntryHeader {
    fn new(key: &str, tag: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            tag,
            secs: timestamp.timestamp(),
            nanos: timestamp.timestamp_subsec_nanos(),
        }
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.nanos)
    }
}

// == Disk Storage ==
/// Filesystem backend.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    base: PathBuf,
    pather: Pather,
}

impl DiskStorage {
    /// Creates a backend rooted at `base`, using [`DEFAULT_PATHER`].
    /// The directory is created on first write.
    ///
    /// Keys become directory names, so a key that is empty, `.` or `..`, or
    /// that contains a path separator is rejected with [`CacheError::Backend`].
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            pather: DEFAULT_PATHER,
        }
    }

    pub fn with_pather(mut self, pather: Pather) -> Self {
        self.pather = pather;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// File that holds the entry for `(key, params)`. Fails if a path
    /// component would leave `base`.
    pub fn entry_path(&self, key: &str, params: &str) -> Result<PathBuf> {
        let mut path = self.base.clone();
        for part in (self.pather)(key, params) {
            if !is_plain_component(&part) {
                return Err(CacheError::Backend(anyhow!(
                    "invalid cache key {key:?}: path component {part:?} is not a plain name"
                )));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn read_entry(&self, path: &Path) -> Result<StoredEntry> {
        let bytes = fs::read(path).map_err(not_found_or_io)?;
        let split = bytes
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| corrupt(path))?;
        let header: EntryHeader =
            serde_json::from_slice(&bytes[..split]).map_err(|_| corrupt(path))?;
        let timestamp = header.timestamp().ok_or_else(|| corrupt(path))?;
        Ok(StoredEntry::new(bytes[split + 1..].to_vec(), timestamp, header.tag))
    }

    fn read_header(path: &Path) -> Option<EntryHeader> {
        let mut line = Vec::new();
        let mut reader = BufReader::new(File::open(path).ok()?);
        reader.read_until(b'\n', &mut line).ok()?;
        serde_json::from_slice(line.strip_suffix(b"\n")?).ok()
    }

    fn entry_files(&self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(&self.base)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| !path.to_string_lossy().ends_with(TMP_SUFFIX))
    }

    /// Entry files of `key` whose timestamp is before `cutoff`. Files with an
    /// unreadable header are skipped.
    fn expired_files(&self, key: &str, cutoff: DateTime<Utc>) -> Vec<PathBuf> {
        self.entry_files()
            .filter(|path| match Self::read_header(path) {
                Some(header) => {
                    header.key == key && header.timestamp().is_some_and(|ts| ts < cutoff)
                }
                None => {
                    debug!(path = %path.display(), "skipping unreadable cache entry");
                    false
                }
            })
            .collect()
    }
}

impl CacheStorage for DiskStorage {
    fn get(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let entry = self.read_entry(&self.entry_path(key, params)?)?;
        entry.check(&config.entry_tag(), cutoff)?;
        Ok(entry.data)
    }

    fn set(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        value: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.entry_path(key, params)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = EntryHeader::new(key, config.entry_tag(), timestamp);
        let mut contents = serde_json::to_vec(&header).map_err(|e| CacheError::Backend(e.into()))?;
        contents.push(b'\n');
        contents.extend_from_slice(&value);

        // write then rename so readers never observe a partial entry
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".{:08x}{}", rand::random::<u32>(), TMP_SUFFIX));
        fs::write(&tmp, contents)?;
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn entry_count(&self) -> Result<u64> {
        Ok(self.entry_files().count() as u64)
    }

    fn expired_entry_count(
        &self,
        key: &str,
        _config: &KeyConfig,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self.expired_files(key, cutoff).len() as u64)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.base) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::create_dir_all(&self.base)?;
        Ok(())
    }

    fn cleanup(&self, key: &str, _config: &KeyConfig, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0;
        for path in self.expired_files(key, cutoff) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(key, removed, "disk cleanup");
        Ok(removed)
    }
}

fn is_plain_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.contains(['/', '\\', '\0'])
}

fn not_found_or_io(err: io::Error) -> CacheError {
    if err.kind() == io::ErrorKind::NotFound {
        CacheError::EntryNotFound
    } else {
        CacheError::Io(err)
    }
}

fn corrupt(path: &Path) -> CacheError {
    CacheError::Backend(anyhow!("corrupt cache entry {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BodyCodec, Compression};
    use crate::storage::sha256_base64_pather;
    use chrono::TimeDelta;

    fn config() -> KeyConfig {
        KeyConfig::with_ttl(5)
    }

    fn storage() -> (tempfile::TempDir, DiskStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().join("cache"));
        (dir, storage)
    }

    #[test]
    fn test_disk_set_and_get() {
        let (_dir, storage) = storage();
        let now = Utc::now();

        storage.set("hello", &config(), "p", b"value\nwith newline".to_vec(), now).unwrap();
        let value = storage.get("hello", &config(), "p", now).unwrap();

        assert_eq!(value, b"value\nwith newline");
        assert_eq!(storage.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_disk_get_nonexistent() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.get("hello", &config(), "p", Utc::now()),
            Err(CacheError::EntryNotFound)
        ));
        assert_eq!(storage.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_disk_expired_and_tag_mismatch() {
        let (_dir, storage) = storage();
        let now = Utc::now();
        storage.set("hello", &config(), "p", b"v".to_vec(), now).unwrap();

        assert!(matches!(
            storage.get("hello", &config(), "p", now + TimeDelta::seconds(1)),
            Err(CacheError::EntryExpired)
        ));

        let other = config().body(BodyCodec::MsgPack).compression(Compression::Zstd);
        assert!(matches!(
            storage.get("hello", &other, "p", now),
            Err(CacheError::EntryNotFound)
        ));
    }

    #[test]
    fn test_disk_overwrite() {
        let (_dir, storage) = storage();
        let now = Utc::now();
        storage.set("hello", &config(), "p", b"one".to_vec(), now).unwrap();
        storage.set("hello", &config(), "p", b"two".to_vec(), now).unwrap();

        assert_eq!(storage.get("hello", &config(), "p", now).unwrap(), b"two");
        assert_eq!(storage.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_disk_cleanup_is_scoped_to_key() {
        let (_dir, storage) = storage();
        let now = Utc::now();
        let old = now - TimeDelta::hours(1);
        let cutoff = now - TimeDelta::seconds(5);

        storage.set("a", &config(), "1", b"x".to_vec(), old).unwrap();
        storage.set("a", &config(), "2", b"x".to_vec(), now).unwrap();
        storage.set("b", &config(), "1", b"x".to_vec(), old).unwrap();

        assert_eq!(storage.expired_entry_count("a", &config(), cutoff).unwrap(), 1);
        assert_eq!(storage.cleanup("a", &config(), cutoff).unwrap(), 1);
        assert_eq!(storage.entry_count().unwrap(), 2);
        assert_eq!(storage.expired_entry_count("b", &config(), cutoff).unwrap(), 1);
    }

    #[test]
    fn test_disk_clear() {
        let (_dir, storage) = storage();
        storage.set("a", &config(), "1", b"x".to_vec(), Utc::now()).unwrap();
        storage.clear().unwrap();

        assert_eq!(storage.entry_count().unwrap(), 0);
        assert!(storage.base().is_dir());
    }

    #[test]
    fn test_disk_corrupt_entry_is_backend_error() {
        let (_dir, storage) = storage();
        let path = storage.entry_path("hello", "p").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"no header here").unwrap();

        assert!(matches!(
            storage.get("hello", &config(), "p", Utc::now()),
            Err(CacheError::Backend(_))
        ));
        assert_eq!(storage.cleanup("hello", &config(), Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_disk_custom_pather() {
        let (_dir, storage) = storage();
        let storage = storage.with_pather(sha256_base64_pather);
        let now = Utc::now();

        storage.set("hello", &config(), "p", b"v".to_vec(), now).unwrap();
        let path = storage.entry_path("hello", "p").unwrap();
        assert!(path.is_file());
        assert_eq!(
            path.parent().unwrap().parent().unwrap().parent().unwrap(),
            storage.base().join("hello")
        );
    }

    #[test]
    fn test_disk_keeps_sub_millisecond_timestamps() {
        let (_dir, storage) = storage();
        let stamp = DateTime::from_timestamp(1_714_564_800, 123_456_789).unwrap();
        storage.set("hello", &config(), "p", b"v".to_vec(), stamp).unwrap();

        // fresh exactly at the cutoff, expired one nanosecond later
        assert_eq!(storage.get("hello", &config(), "p", stamp).unwrap(), b"v");
        assert!(matches!(
            storage.get("hello", &config(), "p", stamp + TimeDelta::nanoseconds(1)),
            Err(CacheError::EntryExpired)
        ));
        assert_eq!(
            storage.expired_entry_count("hello", &config(), stamp + TimeDelta::nanoseconds(1)).unwrap(),
            1
        );
    }

    #[test]
    fn test_disk_far_timestamps_round_trip() {
        let (_dir, storage) = storage();
        let far = Utc::now() + TimeDelta::days(365 * 1000);
        storage.set("hello", &config(), "p", b"v".to_vec(), far).unwrap();

        assert_eq!(storage.get("hello", &config(), "p", far).unwrap(), b"v");
    }

    #[test]
    fn test_disk_rejects_keys_outside_base() {
        let (dir, storage) = storage();
        let now = Utc::now();

        for key in ["", ".", "..", "../escape", "a/b", "a\\b"] {
            assert!(
                matches!(
                    storage.set(key, &config(), "p", b"v".to_vec(), now),
                    Err(CacheError::Backend(_))
                ),
                "key {key:?} was accepted"
            );
            assert!(matches!(
                storage.get(key, &config(), "p", now),
                Err(CacheError::Backend(_))
            ));
        }

        let written = WalkDir::new(dir.path())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .count();
        assert_eq!(written, 0);
        assert!(storage.entry_path("..hidden", "p").is_ok());
    }

    #[test]
    fn test_disk_failed_rename_leaves_no_temp_file() {
        let (_dir, storage) = storage();
        // a non-empty directory at the entry path makes the rename fail
        let path = storage.entry_path("hello", "p").unwrap();
        fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(matches!(
            storage.set("hello", &config(), "p", b"v".to_vec(), Utc::now()),
            Err(CacheError::Io(_))
        ));

        let leftovers: Vec<_> = WalkDir::new(storage.base())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(TMP_SUFFIX))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
