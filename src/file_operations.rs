//! Safe rename planning and execution
//!
//! A rename plan is conceptually a simultaneous permutation of paths, but it
//! is carried out one `rename` at a time. Whenever an entry's destination is
//! still occupied by a source that has not moved yet, that entry first moves
//! to a temporary name and only reaches its destination after every other
//! entry has run. No rename ever lands on a file that has not been moved away.

use crate::naming::EpisodeTarget;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that make a whole plan unusable
#[derive(Debug, Error)]
pub enum FileOperationError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Source appears more than once in the rename plan: {0}")]
    DuplicateSource(PathBuf),

    #[error("Several files would be renamed to {0}")]
    DuplicateDestination(PathBuf),

    #[error("Source does not exist: {0}")]
    MissingSource(PathBuf),
}

/// Why a single entry could not be renamed
#[derive(Debug, Error)]
pub enum RenameFailure {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("destination exists and is not part of this rename: {0}")]
    DestinationOccupied(PathBuf),
}

/// Why a single entry was not attempted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file at the destination was never moved away
    DestinationNotVacated(PathBuf),
    /// The entry is stranded at its temporary name
    LeftAtTemporary(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DestinationNotVacated(path) => {
                write!(f, "{} was not moved out of the way", path.display())
            }
            SkipReason::LeftAtTemporary(path) => {
                write!(f, "file left at temporary name {}", path.display())
            }
        }
    }
}

/// One entry of a rename plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    /// Current path
    pub source: PathBuf,
    /// Path after renaming
    pub destination: PathBuf,
    /// Aired episode the destination names, for episode renames
    pub target: Option<EpisodeTarget>,
}

impl PlannedRename {
    /// A plain rename, e.g. of a season directory
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            target: None,
        }
    }

    /// A rename of an episode file to its aired target
    pub fn for_episode(source: PathBuf, destination: PathBuf, target: EpisodeTarget) -> Self {
        Self {
            source,
            destination,
            target: Some(target),
        }
    }

    /// True if the entry is already correctly named
    pub fn is_noop(&self) -> bool {
        self.source == self.destination
    }
}

/// Role of one filesystem rename within the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Source straight to destination
    Direct,
    /// Source out of the way to a temporary name
    ToTemporary,
    /// Temporary name to destination
    FromTemporary,
    /// Temporary name back to the source after the destination stayed occupied
    Restore,
}

/// One filesystem rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOp {
    /// Index of the plan entry this operation belongs to
    pub entry: usize,
    pub kind: OperationKind,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Final state of one plan entry
#[derive(Debug)]
pub enum RenameOutcome {
    Renamed,
    /// Source and destination were identical
    Unchanged,
    Failed(RenameFailure),
    Skipped(SkipReason),
}

/// Outcome of one plan entry
#[derive(Debug)]
pub struct RenameResult {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: RenameOutcome,
}

impl RenameResult {
    /// True for entries that failed or were skipped
    pub fn is_problem(&self) -> bool {
        matches!(
            self.outcome,
            RenameOutcome::Failed(_) | RenameOutcome::Skipped(_)
        )
    }
}

/// Everything a run did (or would do, in dry-run mode)
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Filesystem renames in execution order
    pub operations: Vec<RenameOp>,
    /// One result per plan entry, in plan order
    pub results: Vec<RenameResult>,
}

impl ExecutionReport {
    /// Number of entries that reached their destination
    pub fn renamed(&self) -> usize {
        self.count(|o| matches!(o, RenameOutcome::Renamed))
    }

    /// Number of entries that already had their destination name
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, RenameOutcome::Unchanged))
    }

    /// Entries that failed or were skipped
    pub fn problems(&self) -> impl Iterator<Item = &RenameResult> {
        self.results.iter().filter(|r| r.is_problem())
    }

    /// True if no entry failed or was skipped
    pub fn is_success(&self) -> bool {
        self.problems().next().is_none()
    }

    fn count(&self, predicate: impl Fn(&RenameOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Performs single renames
///
/// Different implementations can touch the filesystem or only pretend to.
pub trait Renamer {
    /// Renames `from` to `to`
    ///
    /// # Errors
    /// Returns `io::Error` if the rename fails
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Returns true if something exists at `path`
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}

/// Renames on the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRenamer;

impl Renamer for FsRenamer {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        debug!("rename {} -> {}", from.display(), to.display());
        fs::rename(from, to)
    }
}

/// `DryRun` implementation - only logs operations without touching anything
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRenamer;

impl Renamer for DryRunRenamer {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        debug!("[dry-run] rename {} -> {}", from.display(), to.display());
        Ok(())
    }
}

/// Why an entry was excluded while scheduling
#[derive(Debug, Clone)]
enum Blocked {
    Occupied(PathBuf),
    NotVacated(PathBuf),
}

/// A validated plan with its conflict-free operation order
#[derive(Debug)]
pub struct Schedule {
    entries: Vec<PlannedRename>,
    blocked: Vec<Option<Blocked>>,
    operations: Vec<RenameOp>,
}

impl Schedule {
    /// Validates `plan` and orders its operations
    ///
    /// Entries are processed in plan order. An entry whose destination is
    /// still a pending source detours through a temporary name; all detoured
    /// entries are completed after the direct ones. Entries targeting a path
    /// that exists but is not part of the plan are excluded, and so is every
    /// entry that would need such an excluded entry to move first.
    pub fn build<R>(plan: Vec<PlannedRename>, renamer: &R) -> Result<Self, FileOperationError>
    where
        R: Renamer + ?Sized,
    {
        let mut sources = HashSet::new();
        let mut destinations = HashSet::new();
        for entry in &plan {
            if !sources.insert(entry.source.as_path()) {
                return Err(FileOperationError::DuplicateSource(entry.source.clone()));
            }
            if !destinations.insert(entry.destination.as_path()) {
                return Err(FileOperationError::DuplicateDestination(
                    entry.destination.clone(),
                ));
            }
            if !renamer.exists(&entry.source) {
                return Err(FileOperationError::MissingSource(entry.source.clone()));
            }
        }

        // Sources that will move, and the entry moving each
        let moving: HashMap<&Path, usize> = plan
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_noop())
            .map(|(i, e)| (e.source.as_path(), i))
            .collect();

        let mut blocked: Vec<Option<Blocked>> = vec![None; plan.len()];
        for (i, entry) in plan.iter().enumerate() {
            if !entry.is_noop()
                && !moving.contains_key(entry.destination.as_path())
                && renamer.exists(&entry.destination)
            {
                warn!(
                    "Refusing to overwrite {}, it is not part of this rename",
                    entry.destination.display()
                );
                blocked[i] = Some(Blocked::Occupied(entry.destination.clone()));
            }
        }

        // A source that never moves keeps its path occupied
        loop {
            let mut changed = false;
            for (i, entry) in plan.iter().enumerate() {
                if entry.is_noop() || blocked[i].is_some() {
                    continue;
                }
                if let Some(&j) = moving.get(entry.destination.as_path()) {
                    if blocked[j].is_some() {
                        blocked[i] = Some(Blocked::NotVacated(entry.destination.clone()));
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let mut pending: HashSet<&Path> = moving
            .iter()
            .filter(|&(_, &i)| blocked[i].is_none())
            .map(|(&path, _)| path)
            .collect();
        let mut reserved: HashSet<PathBuf> = plan
            .iter()
            .flat_map(|e| [e.source.clone(), e.destination.clone()])
            .collect();

        let mut operations = Vec::with_capacity(plan.len());
        let mut deferred = Vec::new();

        for (i, entry) in plan.iter().enumerate() {
            if entry.is_noop() || blocked[i].is_some() {
                continue;
            }

            if pending.contains(entry.destination.as_path()) {
                let temporary = temporary_name(&entry.source, &reserved, renamer);
                debug!(
                    "{} is still in use, detouring {} through {}",
                    entry.destination.display(),
                    entry.source.display(),
                    temporary.display()
                );
                reserved.insert(temporary.clone());
                operations.push(RenameOp {
                    entry: i,
                    kind: OperationKind::ToTemporary,
                    from: entry.source.clone(),
                    to: temporary.clone(),
                });
                deferred.push((i, temporary));
            } else {
                operations.push(RenameOp {
                    entry: i,
                    kind: OperationKind::Direct,
                    from: entry.source.clone(),
                    to: entry.destination.clone(),
                });
            }

            pending.remove(entry.source.as_path());
        }

        for (i, temporary) in deferred {
            operations.push(RenameOp {
                entry: i,
                kind: OperationKind::FromTemporary,
                from: temporary,
                to: plan[i].destination.clone(),
            });
        }

        Ok(Self {
            entries: plan,
            blocked,
            operations,
        })
    }

    /// The plan entries, in plan order
    pub fn entries(&self) -> &[PlannedRename] {
        &self.entries
    }

    /// The operations to perform, in execution order
    pub fn operations(&self) -> &[RenameOp] {
        &self.operations
    }
}

/// Picks a free hidden name next to `source`
///
/// Names are numbered rather than random so that a dry run reports exactly
/// the names a live run uses.
fn temporary_name<R>(source: &Path, reserved: &HashSet<PathBuf>, renamer: &R) -> PathBuf
where
    R: Renamer + ?Sized,
{
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut n: u32 = 0;
    loop {
        let candidate = parent.join(format!(".{file_name}.tv_rename-{n}.tmp"));
        if !reserved.contains(&candidate) && !renamer.exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Runs a schedule
///
/// A failing rename is recorded for its entry and execution continues. Paths
/// whose file could not be moved are tracked, and any later operation aiming
/// at such a path is skipped instead of overwriting it. A detoured entry
/// whose destination stays occupied is moved back to its original name when
/// that name is free.
pub fn execute<R>(schedule: &Schedule, renamer: &R) -> ExecutionReport
where
    R: Renamer + ?Sized,
{
    let mut outcomes: Vec<Option<RenameOutcome>> = schedule
        .entries
        .iter()
        .zip(&schedule.blocked)
        .map(|(entry, blocked)| match blocked {
            Some(Blocked::Occupied(path)) => Some(RenameOutcome::Failed(
                RenameFailure::DestinationOccupied(path.clone()),
            )),
            Some(Blocked::NotVacated(path)) => Some(RenameOutcome::Skipped(
                SkipReason::DestinationNotVacated(path.clone()),
            )),
            None if entry.is_noop() => Some(RenameOutcome::Unchanged),
            None => None,
        })
        .collect();

    let mut stuck: HashSet<PathBuf> = HashSet::new();
    let mut performed = Vec::with_capacity(schedule.operations.len());

    for op in &schedule.operations {
        let entry = &schedule.entries[op.entry];

        match op.kind {
            OperationKind::Direct | OperationKind::ToTemporary => {
                if stuck.contains(&op.to) {
                    outcomes[op.entry] = Some(RenameOutcome::Skipped(
                        SkipReason::DestinationNotVacated(op.to.clone()),
                    ));
                    stuck.insert(op.from.clone());
                    continue;
                }

                match renamer.rename(&op.from, &op.to) {
                    Ok(()) => {
                        performed.push(op.clone());
                        if op.kind == OperationKind::Direct {
                            info!(
                                "Renamed \"{}\" -> \"{}\"",
                                entry.source.display(),
                                entry.destination.display()
                            );
                            outcomes[op.entry] = Some(RenameOutcome::Renamed);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to rename {}: {e}", op.from.display());
                        outcomes[op.entry] = Some(RenameOutcome::Failed(e.into()));
                        stuck.insert(op.from.clone());
                    }
                }
            }
            OperationKind::FromTemporary => {
                // The detour itself failed or was skipped
                if outcomes[op.entry].is_some() {
                    continue;
                }

                if stuck.contains(&op.to) {
                    let reason = if !renamer.exists(&entry.source)
                        && renamer.rename(&op.from, &entry.source).is_ok()
                    {
                        performed.push(RenameOp {
                            entry: op.entry,
                            kind: OperationKind::Restore,
                            from: op.from.clone(),
                            to: entry.source.clone(),
                        });
                        stuck.insert(entry.source.clone());
                        SkipReason::DestinationNotVacated(op.to.clone())
                    } else {
                        SkipReason::LeftAtTemporary(op.from.clone())
                    };
                    warn!("Skipped {}: {reason}", entry.source.display());
                    outcomes[op.entry] = Some(RenameOutcome::Skipped(reason));
                    continue;
                }

                match renamer.rename(&op.from, &op.to) {
                    Ok(()) => {
                        performed.push(op.clone());
                        info!(
                            "Renamed \"{}\" -> \"{}\"",
                            entry.source.display(),
                            entry.destination.display()
                        );
                        outcomes[op.entry] = Some(RenameOutcome::Renamed);
                    }
                    Err(e) => {
                        warn!(
                            "Failed to rename {} (now at {}): {e}",
                            entry.source.display(),
                            op.from.display()
                        );
                        outcomes[op.entry] = Some(RenameOutcome::Failed(e.into()));
                    }
                }
            }
            OperationKind::Restore => {}
        }
    }

    let results = schedule
        .entries
        .iter()
        .zip(outcomes)
        .map(|(entry, outcome)| RenameResult {
            source: entry.source.clone(),
            destination: entry.destination.clone(),
            // Every scheduled entry is settled by its last operation
            outcome: outcome.unwrap_or(RenameOutcome::Unchanged),
        })
        .collect();

    ExecutionReport {
        operations: performed,
        results,
    }
}

/// Plans and executes a rename plan, or only reports it in dry-run mode
pub fn plan_and_execute(
    plan: Vec<PlannedRename>,
    dry_run: bool,
) -> Result<ExecutionReport, FileOperationError> {
    plan_and_execute_with(plan, dry_run, |_| Ok(()))
}

/// Like [`plan_and_execute`], running `before_execute` on the validated
/// schedule before the first rename.
pub(crate) fn plan_and_execute_with<F>(
    plan: Vec<PlannedRename>,
    dry_run: bool,
    before_execute: F,
) -> Result<ExecutionReport, FileOperationError>
where
    F: FnOnce(&Schedule) -> Result<(), FileOperationError>,
{
    let renamer: Box<dyn Renamer> = if dry_run {
        Box::new(DryRunRenamer)
    } else {
        Box::new(FsRenamer)
    };

    let schedule = Schedule::build(plan, renamer.as_ref())?;
    before_execute(&schedule)?;
    Ok(execute(&schedule, renamer.as_ref()))
}
