//! File resolver module for locating episode files and season directories
//!
//! A series root is expected to contain season directories (`Season 1`, ...)
//! which in turn contain the episode files. Hidden entries (leading dot) are
//! never returned, so leftover temporary names are not mistaken for episodes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during file resolution
#[derive(Debug, Error)]
pub enum FileResolverError {
    /// Path is not a directory
    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Failed to read directory
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed { path: PathBuf, source: io::Error },

    /// Failed to read directory entry
    #[error("Failed to read directory entry: {0}")]
    ReadEntryFailed(#[from] io::Error),
}

/// Finds all episode files one level below the season directories of `root`
///
/// Equivalent to the glob `root/*/*`, restricted to regular files accepted by
/// `accept`. The result is unordered.
pub(crate) fn scan_series(
    root: &Path,
    accept: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, FileResolverError> {
    let mut files = Vec::new();

    for dir in list_entries(root)?.into_iter().filter(|p| p.is_dir()) {
        files.extend(
            list_entries(&dir)?
                .into_iter()
                .filter(|p| p.is_file() && accept(p)),
        );
    }

    Ok(files)
}

/// Finds the episode files directly inside one season directory
pub(crate) fn scan_season(
    dir: &Path,
    accept: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, FileResolverError> {
    Ok(list_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && accept(p))
        .collect())
}

/// Lists the sub-directories of `dir`
pub(crate) fn list_subdirectories(dir: &Path) -> Result<Vec<PathBuf>, FileResolverError> {
    Ok(list_entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect())
}

/// Lists the sub-directories of `dir` whose names carry a season number
pub fn find_season_directories(dir: &Path) -> Result<Vec<PathBuf>, FileResolverError> {
    Ok(list_subdirectories(dir)?
        .into_iter()
        .filter(|p| season_number_of(p).is_some())
        .collect())
}

/// Extracts the season number from a directory named like `Season 3`
///
/// Matching is case-insensitive and only looks at the start of the name, so
/// `season 03 (1080p)` yields 3.
pub fn season_number_of(dir: &Path) -> Option<u32> {
    let name = dir.file_name()?.to_str()?;
    let prefix = name.get(..7)?;
    if !prefix.eq_ignore_ascii_case("season ") {
        return None;
    }

    let rest = &name[7..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Lists the non-hidden entries of a directory
fn list_entries(dir: &Path) -> Result<Vec<PathBuf>, FileResolverError> {
    if !dir.is_dir() {
        return Err(FileResolverError::NotADirectory(dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| FileResolverError::ReadDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        entries.push(entry.path());
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn is_video(path: &Path) -> bool {
        path.extension().is_some_and(|e| e == "mkv")
    }

    #[test]
    fn test_scan_nonexistent_directory() {
        let result = scan_series(Path::new("/nonexistent/path/that/does/not/exist"), is_video);
        assert!(matches!(result, Err(FileResolverError::NotADirectory(_))));
    }

    #[test]
    fn test_scan_file_instead_of_directory() {
        let temp = tempfile::tempdir().unwrap();
        let temp_file = temp.path().join("test_file.txt");
        File::create(&temp_file).unwrap();

        assert!(scan_season(&temp_file, is_video).is_err());
    }

    #[test]
    fn test_scan_series_two_levels() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("Season 1/nested")).unwrap();
        fs::create_dir_all(root.join("Season 2")).unwrap();
        File::create(root.join("top.mkv")).unwrap();
        File::create(root.join("Season 1/a.mkv")).unwrap();
        File::create(root.join("Season 1/a.srt")).unwrap();
        File::create(root.join("Season 1/.hidden.mkv")).unwrap();
        File::create(root.join("Season 1/nested/deep.mkv")).unwrap();
        File::create(root.join("Season 2/b.mkv")).unwrap();

        let mut files = scan_series(root, is_video).unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![root.join("Season 1/a.mkv"), root.join("Season 2/b.mkv")]
        );
    }

    #[test]
    fn test_season_number_of() {
        assert_eq!(season_number_of(Path::new("/x/Season 3")), Some(3));
        assert_eq!(season_number_of(Path::new("season 03 (1080p)")), Some(3));
        assert_eq!(season_number_of(Path::new("SEASON 12")), Some(12));
        assert_eq!(season_number_of(Path::new("Season")), None);
        assert_eq!(season_number_of(Path::new("Season x")), None);
        assert_eq!(season_number_of(Path::new("Specials")), None);
    }

    #[test]
    fn test_find_season_directories() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("Season 1")).unwrap();
        fs::create_dir(temp.path().join("Extras")).unwrap();
        File::create(temp.path().join("Season 2")).unwrap();

        assert_eq!(
            find_season_directories(temp.path()).unwrap(),
            vec![temp.path().join("Season 1")]
        );
    }
}
