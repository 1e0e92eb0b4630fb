//! Cache storage module
//!
//! This module provides persistent caching in the system's standard cache
//! directory. Data is serialized to JSON and expires after an optional
//! time-to-live. It holds credentials only; episode orderings are always
//! fetched fresh.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to determine cache directory location
    #[error("Failed to determine cache directory location")]
    CacheDirectoryNotFound,

    /// Failed to create or access cache directory
    #[error("Failed to create cache directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read cached data
    #[error("Failed to read cache file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write cached data
    #[error("Failed to write cache file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to deserialize cached data
    #[error("Failed to deserialize cache file {path}: {source}")]
    DeserializationFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize data for caching
    #[error("Failed to serialize data: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// A generic cache storage for serializable data
///
/// Entries older than the configured time-to-live are treated as missing.
#[derive(Debug)]
pub(crate) struct CacheStorage<T> {
    /// The directory where cached data is stored
    cache_dir: PathBuf,
    /// Maximum age of an entry, `None` keeps entries forever
    ttl: Option<Duration>,
    _phantom: PhantomData<T>,
}

impl<T> CacheStorage<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    /// Opens or creates a cache storage with the given name
    ///
    /// The cache lives in the system's standard cache directory under a
    /// subdirectory named after the sanitized `name`.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let cache: CacheStorage<TvdbToken> =
    ///     CacheStorage::open("tvdb", Some(Duration::from_secs(3600)))?;
    /// ```
    pub fn open(name: &str, ttl: Option<Duration>) -> Result<Self, CacheError> {
        let proj_dirs = directories::ProjectDirs::from("com", "fastily", "tv_rename")
            .ok_or(CacheError::CacheDirectoryNotFound)?;

        Self::open_in(&proj_dirs.cache_dir().join(sanitize_name(name)), ttl)
    }

    /// Opens or creates a cache storage in an explicit directory
    pub fn open_in(cache_dir: &Path, ttl: Option<Duration>) -> Result<Self, CacheError> {
        fs::create_dir_all(cache_dir).map_err(|e| CacheError::DirectoryCreationFailed {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            ttl,
            _phantom: PhantomData,
        })
    }

    /// Loads cached data for the given identifier
    ///
    /// Returns `None` if nothing is stored or the entry has expired. Returns
    /// an error if the entry exists but cannot be read or deserialized.
    pub fn load(&self, identifier: &str) -> Result<Option<T>, CacheError> {
        let file_path = self.entry_path(identifier);

        if !file_path.exists() || self.is_expired(&file_path) {
            return Ok(None);
        }

        let content = fs::read_to_string(&file_path).map_err(|e| CacheError::ReadFailed {
            path: file_path.clone(),
            source: e,
        })?;

        let data =
            serde_json::from_str(&content).map_err(|e| CacheError::DeserializationFailed {
                path: file_path,
                source: e,
            })?;

        Ok(Some(data))
    }

    /// Stores data in the cache with the given identifier
    pub fn store(&self, identifier: &str, data: &T) -> Result<(), CacheError> {
        let file_path = self.entry_path(identifier);
        let content = serde_json::to_string_pretty(data)?;

        fs::write(&file_path, content).map_err(|e| CacheError::WriteFailed {
            path: file_path,
            source: e,
        })
    }

    /// Removes the entry for the given identifier, if any
    ///
    /// A failed removal is logged only; the entry then expires by its TTL.
    pub fn remove(&self, identifier: &str) {
        let file_path = self.entry_path(identifier);
        match fs::remove_file(&file_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!("Could not remove cache entry {}: {e}", file_path.display()),
        }
    }

    fn entry_path(&self, identifier: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", sanitize_name(identifier)))
    }

    fn is_expired(&self, file_path: &Path) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };

        // An unreadable timestamp counts as expired
        fs::metadata(file_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_none_or(|age| age > ttl)
    }
}

/// Sanitizes a name for use in file paths
///
/// Converts to lowercase and replaces all characters that are not
/// a-z, 0-9, or hyphen with underscores.
fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        value: String,
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Simple"), "simple");
        assert_eq!(sanitize_name("With Spaces"), "with_spaces");
        assert_eq!(sanitize_name("With-Hyphens"), "with-hyphens");
        assert_eq!(sanitize_name("Special!@#$%"), "special_____");
    }

    #[test]
    fn test_store_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::<Entry>::open_in(dir.path(), None).unwrap();

        assert_eq!(cache.load("token").unwrap(), None);

        let entry = Entry {
            value: "abc".to_string(),
        };
        cache.store("token", &entry).unwrap();
        assert_eq!(cache.load("token").unwrap(), Some(entry));

        cache.remove("token");
        assert_eq!(cache.load("token").unwrap(), None);
    }

    #[test]
    fn test_remove_tolerates_missing_and_stuck_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::<Entry>::open_in(dir.path(), None).unwrap();

        cache.remove("never-stored");

        // A directory in place of the entry file cannot be removed as a file
        fs::create_dir(dir.path().join("stuck.json")).unwrap();
        cache.remove("stuck");
        assert!(dir.path().join("stuck.json").is_dir());

        let entry = Entry {
            value: "still usable".to_string(),
        };
        cache.store("token", &entry).unwrap();
        assert_eq!(cache.load("token").unwrap(), Some(entry));
    }

    #[test]
    fn test_expired_entry_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::<Entry>::open_in(dir.path(), Some(Duration::ZERO)).unwrap();

        cache
            .store(
                "token",
                &Entry {
                    value: "old".to_string(),
                },
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.load("token").unwrap(), None);
    }

    #[test]
    fn test_corrupt_entry_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStorage::<Entry>::open_in(dir.path(), None).unwrap();
        fs::write(dir.path().join("token.json"), "not json").unwrap();

        assert!(matches!(
            cache.load("token"),
            Err(CacheError::DeserializationFailed { .. })
        ));
    }
}
