//! tv_rename - Rename TV episode files into aired order
//!
//! This library orders local episode files, aligns them against an episode
//! ordering from TheTVDB (aired, DVD, absolute or streaming) and renames them
//! to their aired season and episode numbers. Renames are planned as one
//! permutation and executed so that no file is ever overwritten, even when
//! the permutation contains cycles.
//!
//! Every workflow is split into a `prepare_*` step producing the rename plan
//! and [`execute_run`], so callers can show or confirm the plan in between.

mod alignment;
mod cache;
mod cli;
mod config;
mod file_operations;
mod file_resolver;
mod metadata_retrieval;
mod mismatch;
mod naming;
mod sequencer;

use alignment::{align, apply_split_hints, combine_shared_positions, resolve_targets, total_parts};
use mismatch::Decision;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

// Re-export error types
pub use cache::CacheError;
pub use config::ConfigError;
pub use file_operations::FileOperationError;
pub use file_resolver::FileResolverError;
pub use metadata_retrieval::MetadataRetrievalError;

pub use cli::{Cli, Commands, CommonArgs, OrderArg};

pub use alignment::{AlignedEntry, Alignment, ResolvedTargets};
pub use config::{DEFAULT_EXTENSIONS, RenameConfig, SplitHint};
pub use file_operations::{
    DryRunRenamer, ExecutionReport, FsRenamer, OperationKind, PlannedRename, RenameFailure,
    RenameOp, RenameOutcome, RenameResult, Renamer, Schedule, SkipReason, execute,
    plan_and_execute,
};
pub use file_resolver::{find_season_directories, season_number_of};
pub use metadata_retrieval::{
    EpisodeOrderProvider, InMemoryProvider, OrderingVariant, RemoteEpisode, TvdbCredentials,
    TvdbProvider,
};
pub use naming::{
    DEFAULT_PART_SEPARATOR, DEFAULT_TEMPLATE, EpisodeTarget, NUMBERED_TEMPLATE, NamingScheme,
    sanitize_filename,
};
pub use sequencer::{LocalEntry, SortMode, lexicographic_cmp, natural_cmp, sequence};

/// Progress event emitted while preparing and executing a run
///
/// These events allow library users to report progress however they like,
/// or to stay silent.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Work on a directory started
    Started { directory: PathBuf },

    /// Scanning a directory for entries to rename
    Scanning { directory: PathBuf },

    /// Entries found and ordered
    EntriesFound { count: usize },

    /// Fetching the remote episode ordering
    FetchingOrder {
        series_id: u64,
        variant: OrderingVariant,
    },

    /// Remote ordering fetched
    OrderFetched {
        episode_count: usize,
        part_count: usize,
    },

    /// Local and remote counts differ but the run continues
    MismatchTolerated { local: usize, remote: usize },

    /// Rename plan built
    PlanReady { entries: usize },

    /// A missing destination directory is created (or would be, in dry-run mode)
    CreatingDirectory { path: PathBuf, dry_run: bool },

    /// Execution finished
    Complete {
        renamed: usize,
        unchanged: usize,
        problems: usize,
    },
}

/// A rename plan ready for execution
#[derive(Debug, Clone, Default)]
pub struct PreparedRun {
    /// Renames to perform
    pub plan: Vec<PlannedRename>,
    /// Local entries that are left untouched
    pub unmatched_local: Vec<PathBuf>,
    /// Remote episodes no local entry was aligned with
    pub unmatched_remote: Vec<RemoteEpisode>,
    /// Aired episodes the requested ordering does not list
    pub missing_aired: Vec<RemoteEpisode>,
}

/// Everything a finished run reports
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Operations and per-entry outcomes
    pub report: ExecutionReport,
    /// Local entries that were left untouched
    pub unmatched_local: Vec<PathBuf>,
    /// Remote episodes no local entry was aligned with
    pub unmatched_remote: Vec<RemoteEpisode>,
    /// Season directories created (or that would be created)
    pub created_directories: Vec<PathBuf>,
}

/// Top-level error type for tv_rename operations
#[derive(Debug, Error)]
pub enum TvRenameError {
    /// Error while scanning directories
    #[error("File resolution error: {0}")]
    FileResolver(#[from] FileResolverError),

    /// Error while fetching or translating the remote ordering
    #[error("Metadata retrieval error: {0}")]
    MetadataRetrieval(#[from] MetadataRetrievalError),

    /// Unusable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The rename plan is invalid
    #[error("Rename plan error: {0}")]
    FileOperation(#[from] FileOperationError),

    /// Local and remote counts differ and mismatches are not tolerated
    #[error("Found {local} local files but the remote ordering expects {remote}")]
    CountMismatch { local: usize, remote: usize },

    /// A non-aired ordering lists another number of episodes than were aired
    #[error("The {variant} ordering lists {listed} episodes but {aired} were aired")]
    OrderingMismatch {
        variant: OrderingVariant,
        listed: usize,
        aired: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Plans renaming every episode below `root` into aired order
///
/// Episode files are expected one level below `root` (`root/*/*`), and each
/// one is renamed to `root/Season N/<name>` where `N` is its aired season.
/// The local files are assumed to follow `config.variant`; a non-aired
/// ordering is translated through `provider`.
///
/// # Examples
///
/// ```no_run
/// use tv_rename::{
///     InMemoryProvider, OrderingVariant, RemoteEpisode, RenameConfig, execute_run,
///     prepare_reorder,
/// };
/// use std::path::Path;
///
/// let provider = InMemoryProvider::new(121361).with_order(
///     OrderingVariant::Aired,
///     vec![RemoteEpisode::new(1, 1, 1), RemoteEpisode::new(2, 1, 2)],
/// );
/// let config = RenameConfig::default();
///
/// let run = prepare_reorder(Path::new("/tv/Show"), 121361, &provider, &config, |_| {}).unwrap();
/// let summary = execute_run(run, &config, |_| {}).unwrap();
/// assert!(summary.report.is_success());
/// ```
pub fn prepare_reorder<P, F>(
    root: &Path,
    series_id: u64,
    provider: &P,
    config: &RenameConfig,
    mut progress_callback: F,
) -> Result<PreparedRun, TvRenameError>
where
    P: EpisodeOrderProvider + ?Sized,
    F: FnMut(ProgressEvent),
{
    progress_callback(ProgressEvent::Started {
        directory: root.to_path_buf(),
    });

    progress_callback(ProgressEvent::Scanning {
        directory: root.to_path_buf(),
    });
    let files = file_resolver::scan_series(root, |p| config.accepts(p))?;
    let local = sequence(files, config.sort_mode);
    progress_callback(ProgressEvent::EntriesFound { count: local.len() });

    progress_callback(ProgressEvent::FetchingOrder {
        series_id,
        variant: config.variant,
    });
    let mut remote = provider.fetch_order(series_id, config.variant)?;
    let missing_aired = if config.variant.is_aired() {
        Vec::new()
    } else {
        missing_aired_episodes(provider, series_id, config, &remote)?
    };
    if config.combined {
        remote = combine_shared_positions(remote);
    }
    apply_split_hints(&mut remote, &config.split_hints)?;

    let expected = total_parts(&remote);
    progress_callback(ProgressEvent::OrderFetched {
        episode_count: remote.len(),
        part_count: expected,
    });

    match mismatch::resolve(local.len(), expected, config.ignore_mismatch) {
        Decision::Proceed => {}
        Decision::Abort { local, remote } => {
            return Err(TvRenameError::CountMismatch { local, remote });
        }
        Decision::ProceedPartial {
            aligned,
            excess_local,
            excess_remote,
        } => {
            warn!(
                "Count mismatch tolerated: aligning {aligned}, {excess_local} local files and {excess_remote} remote parts left over"
            );
            progress_callback(ProgressEvent::MismatchTolerated {
                local: local.len(),
                remote: expected,
            });
        }
    }

    let alignment = align(&local, &remote);
    let resolved = resolve_targets(&alignment.aligned, provider, series_id, config)?;

    let show_name = config
        .show_name
        .clone()
        .unwrap_or_else(|| directory_name(root));

    let mut plan = Vec::with_capacity(resolved.targets.len());
    for (entry, target) in resolved.targets {
        let extension = entry
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());
        let name = config
            .naming
            .file_name(&show_name, &target, extension.as_deref());
        let destination = root.join(format!("Season {}", target.season)).join(name);
        plan.push(PlannedRename::for_episode(entry.path, destination, target));
    }

    progress_callback(ProgressEvent::PlanReady {
        entries: plan.len(),
    });

    Ok(PreparedRun {
        plan,
        unmatched_local: alignment
            .unmatched_local
            .into_iter()
            .chain(resolved.untranslated)
            .map(|e| e.path)
            .collect(),
        unmatched_remote: alignment.unmatched_remote,
        missing_aired,
    })
}

/// Compares a non-aired ordering with the aired one
///
/// Differing episode counts abort unless mismatches are tolerated. Returns the
/// aired episodes `order` does not list; they are never renamed to.
fn missing_aired_episodes<P>(
    provider: &P,
    series_id: u64,
    config: &RenameConfig,
    order: &[RemoteEpisode],
) -> Result<Vec<RemoteEpisode>, TvRenameError>
where
    P: EpisodeOrderProvider + ?Sized,
{
    let aired = provider.fetch_order(series_id, OrderingVariant::Aired)?;

    match mismatch::resolve(order.len(), aired.len(), config.ignore_mismatch) {
        Decision::Proceed => {}
        Decision::Abort { local, remote } => {
            return Err(TvRenameError::OrderingMismatch {
                variant: config.variant,
                listed: local,
                aired: remote,
            });
        }
        Decision::ProceedPartial { .. } => warn!(
            "The {} ordering lists {} episodes but {} were aired",
            config.variant,
            order.len(),
            aired.len()
        ),
    }

    let listed: HashSet<u64> = order.iter().map(|e| e.id).collect();
    let missing: Vec<RemoteEpisode> = aired
        .into_iter()
        .filter(|e| !listed.contains(&e.id))
        .collect();
    for episode in &missing {
        warn!(
            "Aired S{:02}E{:02} is not part of the {} ordering",
            episode.season, episode.episode, config.variant
        );
    }

    Ok(missing)
}

/// Lists the `Season N` directories inside `dir` in sequencer order
///
/// Fails if there are none.
pub fn season_directories(dir: &Path, sort_mode: SortMode) -> Result<Vec<PathBuf>, TvRenameError> {
    let found = find_season_directories(dir)?;
    if found.is_empty() {
        return Err(ConfigError::NoSeasonDirectories(dir.to_path_buf()).into());
    }

    Ok(sequence(found, sort_mode)
        .into_iter()
        .map(|e| e.path)
        .collect())
}

/// Plans numbering the episodes of season directories locally
///
/// The files of each directory are numbered 1.. in sequencer order. The season
/// number is `config.season` or the one in the directory name; the show name
/// is `config.show_name` or the name of the directory's parent.
pub fn prepare_numbering<F>(
    dirs: &[PathBuf],
    config: &RenameConfig,
    mut progress_callback: F,
) -> Result<PreparedRun, TvRenameError>
where
    F: FnMut(ProgressEvent),
{
    if config.season.is_some() && dirs.len() > 1 {
        return Err(ConfigError::SeasonWithMultipleDirectories.into());
    }

    let mut plan = Vec::new();
    for dir in dirs {
        progress_callback(ProgressEvent::Started {
            directory: dir.clone(),
        });

        let season = config
            .season
            .or_else(|| season_number_of(dir))
            .ok_or_else(|| ConfigError::NotASeasonDirectory(dir.clone()))?;
        let show_name = config
            .show_name
            .clone()
            .unwrap_or_else(|| parent_directory_name(dir));

        progress_callback(ProgressEvent::Scanning {
            directory: dir.clone(),
        });
        let files = file_resolver::scan_season(dir, |p| config.accepts(p))?;
        let local = sequence(files, config.sort_mode);
        progress_callback(ProgressEvent::EntriesFound { count: local.len() });

        for (episode, entry) in (1u32..).zip(local) {
            let mut target = EpisodeTarget::new(season, episode);
            target.original = entry
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
            let extension = entry
                .path
                .extension()
                .map(|e| e.to_string_lossy().into_owned());
            let name = config
                .naming
                .file_name(&show_name, &target, extension.as_deref());
            let destination = dir.join(name);
            plan.push(PlannedRename::for_episode(entry.path, destination, target));
        }
    }

    progress_callback(ProgressEvent::PlanReady {
        entries: plan.len(),
    });

    Ok(PreparedRun {
        plan,
        ..PreparedRun::default()
    })
}

/// Plans renaming the sub-directories of `dir` to `Season N`
///
/// Directories are taken in sequencer order and numbered from
/// `config.start_season`.
pub fn prepare_season_dirs<F>(
    dir: &Path,
    config: &RenameConfig,
    mut progress_callback: F,
) -> Result<PreparedRun, TvRenameError>
where
    F: FnMut(ProgressEvent),
{
    progress_callback(ProgressEvent::Started {
        directory: dir.to_path_buf(),
    });

    progress_callback(ProgressEvent::Scanning {
        directory: dir.to_path_buf(),
    });
    let subdirectories = sequence(file_resolver::list_subdirectories(dir)?, config.sort_mode);
    progress_callback(ProgressEvent::EntriesFound {
        count: subdirectories.len(),
    });

    let plan: Vec<PlannedRename> = (config.start_season..)
        .zip(subdirectories)
        .map(|(season, entry)| PlannedRename::new(entry.path, dir.join(format!("Season {season}"))))
        .collect();

    progress_callback(ProgressEvent::PlanReady {
        entries: plan.len(),
    });

    Ok(PreparedRun {
        plan,
        ..PreparedRun::default()
    })
}

/// Executes a prepared run, or only reports it when `config.dry_run` is set
///
/// The plan is validated first; nothing is touched when validation fails.
/// Missing destination directories are created right before renaming.
pub fn execute_run<F>(
    prepared: PreparedRun,
    config: &RenameConfig,
    mut progress_callback: F,
) -> Result<RunSummary, TvRenameError>
where
    F: FnMut(ProgressEvent),
{
    let dry_run = config.dry_run;
    let mut missing: BTreeSet<PathBuf> = BTreeSet::new();

    let report = file_operations::plan_and_execute_with(prepared.plan, dry_run, |schedule| {
        missing = schedule
            .operations()
            .iter()
            .filter_map(|op| op.to.parent())
            .filter(|parent| !parent.as_os_str().is_empty() && !parent.exists())
            .map(Path::to_path_buf)
            .collect();

        for directory in &missing {
            progress_callback(ProgressEvent::CreatingDirectory {
                path: directory.clone(),
                dry_run,
            });
            if !dry_run {
                info!("Creating {}", directory.display());
                fs::create_dir_all(directory)?;
            }
        }
        Ok(())
    })?;

    progress_callback(ProgressEvent::Complete {
        renamed: report.renamed(),
        unchanged: report.unchanged(),
        problems: report.problems().count(),
    });

    Ok(RunSummary {
        report,
        unmatched_local: prepared.unmatched_local,
        unmatched_remote: prepared.unmatched_remote,
        created_directories: missing.into_iter().collect(),
    })
}

/// Name of a directory, resolving `.` and similar to the real name
fn directory_name(dir: &Path) -> String {
    let resolved = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Name of the directory containing `dir`
fn parent_directory_name(dir: &Path) -> String {
    let resolved = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    resolved.parent().map(directory_name).unwrap_or_default()
}
