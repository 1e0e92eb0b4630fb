//! Run configuration
//!
//! Everything the ordering, alignment and rename stages need is passed in as
//! one explicit `RenameConfig` value.

use crate::metadata_retrieval::OrderingVariant;
use crate::naming::NamingScheme;
use crate::sequencer::SortMode;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Extensions considered episode files when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi"];

/// Errors caused by an unusable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A split hint does not follow `SxxEyy=N`
    #[error("Invalid split hint '{0}', expected e.g. S01E05=2")]
    InvalidSplitHint(String),

    /// A split hint names an episode the remote ordering does not contain
    #[error("Split hint S{season:02}E{episode:02} matches no remote episode")]
    UnknownSplitHint { season: u32, episode: u32 },

    /// A directory name carries no season number and none was given
    #[error("'{0}' does not follow the standard format (e.g. 'Season 1') and no season number was given")]
    NotASeasonDirectory(PathBuf),

    /// An explicit season number only makes sense for one directory
    #[error("An explicit season number makes no sense with multiple season directories")]
    SeasonWithMultipleDirectories,

    /// Nothing to work on
    #[error("No target directory was given and '{0}' contains no season directories")]
    NoSeasonDirectories(PathBuf),
}

/// Operator hint that one remote episode is split across several local files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitHint {
    /// Season in the requested ordering
    pub season: u32,
    /// Episode in the requested ordering
    pub episode: u32,
    /// Number of local files holding this episode
    pub parts: u32,
}

impl FromStr for SplitHint {
    type Err = ConfigError;

    /// Parses `S01E05=2` (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSplitHint(s.to_string());

        let (position, parts) = s.trim().split_once('=').ok_or_else(invalid)?;
        let position = position.trim().to_ascii_lowercase();
        let (season, episode) = position
            .strip_prefix('s')
            .and_then(|rest| rest.split_once('e'))
            .ok_or_else(invalid)?;

        let season = season.parse().map_err(|_| invalid())?;
        let episode = episode.parse().map_err(|_| invalid())?;
        let parts: u32 = parts.trim().parse().map_err(|_| invalid())?;

        if parts == 0 {
            return Err(invalid());
        }

        Ok(Self {
            season,
            episode,
            parts,
        })
    }
}

/// Configuration threaded through every stage of a run
#[derive(Debug, Clone)]
pub struct RenameConfig {
    /// Comparator for local entries
    pub sort_mode: SortMode,
    /// Report operations without touching the filesystem
    pub dry_run: bool,
    /// Lowercase extensions (without dot) of files to consider
    pub extensions: Vec<String>,
    /// Ordering the local files follow
    pub variant: OrderingVariant,
    /// Proceed on count mismatches, leaving the excess untouched
    pub ignore_mismatch: bool,
    /// Local files may hold several episodes sharing one remote position
    pub combined: bool,
    /// Multipart hints applied to the remote ordering
    pub split_hints: Vec<SplitHint>,
    /// How target file names are rendered
    pub naming: NamingScheme,
    /// First season number when renaming season directories
    pub start_season: u32,
    /// Season number for numbering episodes in a non-standard directory
    pub season: Option<u32>,
    /// Show name for the `{show}` placeholder, defaults to the series directory
    pub show_name: Option<String>,
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            sort_mode: SortMode::default(),
            dry_run: false,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            variant: OrderingVariant::default(),
            ignore_mismatch: false,
            combined: false,
            split_hints: Vec::new(),
            naming: NamingScheme::default(),
            start_season: 1,
            season: None,
            show_name: None,
        }
    }
}

impl RenameConfig {
    /// Replaces the extension filter; entries may carry a leading dot
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Returns true if the path's extension is in the filter
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_split_hint() {
        assert_eq!(
            "S01E05=2".parse::<SplitHint>().unwrap(),
            SplitHint {
                season: 1,
                episode: 5,
                parts: 2
            }
        );
        assert_eq!(
            "s3e12 = 3".parse::<SplitHint>().unwrap(),
            SplitHint {
                season: 3,
                episode: 12,
                parts: 3
            }
        );
    }

    #[test]
    fn test_parse_split_hint_invalid() {
        for bad in ["S01E05", "01E05=2", "S01E05=0", "SxEy=2", "S01E05=two"] {
            assert!(
                matches!(bad.parse::<SplitHint>(), Err(ConfigError::InvalidSplitHint(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_extension_filter() {
        let config = RenameConfig::default();
        assert!(config.accepts(Path::new("a/b.mkv")));
        assert!(config.accepts(Path::new("a/b.MKV")));
        assert!(!config.accepts(Path::new("a/b.srt")));
        assert!(!config.accepts(Path::new("a/mkv")));

        let config = RenameConfig::default().with_extensions([".SRT"]);
        assert_eq!(config.extensions, vec!["srt"]);
        assert!(config.accepts(Path::new("b.srt")));
        assert!(!config.accepts(Path::new("b.mkv")));
    }
}
