use clap::Parser;
use dialoguer::Confirm;
use std::env;
use std::process;
use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tv_rename::{
    Cli, Commands, OperationKind, PreparedRun, ProgressEvent, RenameConfig, RenameOutcome,
    RenameResult, RunSummary, TvdbProvider, execute_run, prepare_numbering, prepare_reorder,
    prepare_season_dirs, season_directories,
};

fn init_tracing(verbose: bool) {
    // RUST_LOG wins over -v
    let default_filter = if verbose { "tv_rename=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Started { directory } => {
            println!("Working in {}", directory.display());
        }
        ProgressEvent::Scanning { .. } => {}
        ProgressEvent::EntriesFound { count } => {
            if count == 0 {
                println!("Nothing to rename found.");
            } else {
                println!("Found {} entries", count);
            }
        }
        ProgressEvent::FetchingOrder { series_id, variant } => {
            println!("\n=== Fetching {} order of series {} ===", variant, series_id);
        }
        ProgressEvent::OrderFetched {
            episode_count,
            part_count,
        } => {
            if part_count == episode_count {
                println!("Found {} episode(s)", episode_count);
            } else {
                println!(
                    "Found {} episode(s) spread over {} file(s)",
                    episode_count, part_count
                );
            }
        }
        ProgressEvent::MismatchTolerated { local, remote } => {
            println!(
                "Warning: {} local file(s) but {} expected, renaming the overlap only",
                local, remote
            );
        }
        ProgressEvent::PlanReady { entries } => {
            println!("Planned {} rename(s)\n", entries);
        }
        ProgressEvent::CreatingDirectory { path, dry_run } => {
            let prefix = if dry_run { "[dry-run] " } else { "" };
            println!("{}Creating directory {}", prefix, path.display());
        }
        ProgressEvent::Complete {
            renamed,
            unchanged,
            problems,
        } => {
            println!(
                "\nDone: {} renamed, {} already correct, {} problem(s)",
                renamed, unchanged, problems
            );
        }
    }
}

fn print_plan(prepared: &PreparedRun) {
    println!("=== Rename Plan ===\n");
    for entry in prepared.plan.iter().filter(|e| !e.is_noop()) {
        println!(
            "  \"{}\" -> \"{}\"",
            entry.source.display(),
            entry.destination.display()
        );
    }

    if !prepared.unmatched_local.is_empty() {
        println!("\nLeft untouched:");
        for path in &prepared.unmatched_local {
            println!("  {}", path.display());
        }
    }

    if !prepared.unmatched_remote.is_empty() {
        println!("\nEpisodes without a local file:");
        for episode in &prepared.unmatched_remote {
            println!(
                "  S{:02}E{:02} {}",
                episode.season,
                episode.episode,
                episode.title.as_deref().unwrap_or_default()
            );
        }
    }

    if !prepared.missing_aired.is_empty() {
        println!("\nAired episodes missing from the chosen order:");
        for episode in &prepared.missing_aired {
            println!(
                "  S{:02}E{:02} {}",
                episode.season,
                episode.episode,
                episode.title.as_deref().unwrap_or_default()
            );
        }
    }
    println!();
}

/// One line of the live-run summary
fn outcome_line(result: &RenameResult) -> String {
    let source = result.source.display();
    let destination = result.destination.display();
    match &result.outcome {
        RenameOutcome::Renamed => format!("  RENAMED   {} -> {}", source, destination),
        RenameOutcome::Unchanged => format!("  UNCHANGED {}", source),
        RenameOutcome::Failed(failure) => format!("  FAILED    {}: {}", source, failure),
        RenameOutcome::Skipped(reason) => format!("  SKIPPED   {}: {}", source, reason),
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    if !dry_run {
        println!("\n=== Results ===\n");
        for result in &summary.report.results {
            println!("{}", outcome_line(result));
        }
        return;
    }

    println!("\n=== Operations (dry-run, nothing was renamed) ===\n");
    for op in &summary.report.operations {
        let note = match op.kind {
            OperationKind::ToTemporary => " (temporary)",
            OperationKind::Restore => " (restore)",
            OperationKind::Direct | OperationKind::FromTemporary => "",
        };
        println!("  {} -> {}{}", op.from.display(), op.to.display(), note);
    }

    let mut problems = summary.report.problems().peekable();
    if problems.peek().is_some() {
        println!("\n=== Problems ===\n");
        for result in problems {
            println!("{}", outcome_line(result));
        }
    }
}

fn confirm(count: usize) -> Result<bool, dialoguer::Error> {
    Confirm::new()
        .with_prompt(format!("Rename {} entries?", count))
        .default(false)
        .interact()
}

fn prepare(
    command: &Commands,
    config: &RenameConfig,
) -> Result<PreparedRun, Box<dyn std::error::Error>> {
    let prepared = match command {
        Commands::Reorder {
            series_id, root, ..
        } => {
            let credentials = command
                .credentials()
                .ok_or("TheTVDB credentials are missing")?;
            let provider = TvdbProvider::new(credentials)?;
            prepare_reorder(root, *series_id, &provider, config, handle_progress_event)?
        }
        Commands::Number { dirs, .. } => {
            let dirs = if dirs.is_empty() {
                season_directories(&env::current_dir()?, config.sort_mode)?
            } else {
                dirs.clone()
            };
            prepare_numbering(&dirs, config, handle_progress_event)?
        }
        Commands::Seasons { dir, .. } => prepare_season_dirs(dir, config, handle_progress_event)?,
    };

    Ok(prepared)
}

/// Returns false if any entry failed or was skipped
fn run(command: &Commands) -> Result<bool, Box<dyn std::error::Error>> {
    let common = command.common();
    let config = command.config();
    let prepared = prepare(command, &config)?;
    print_plan(&prepared);

    let pending = prepared.plan.iter().filter(|e| !e.is_noop()).count();
    if pending == 0 {
        println!("Everything is already named correctly.");
        return Ok(true);
    }

    if !config.dry_run && !common.yes && !confirm(pending)? {
        println!("Aborted, nothing was renamed.");
        return Ok(true);
    }

    let summary = execute_run(prepared, &config, handle_progress_event)?;
    print_summary(&summary, config.dry_run);

    Ok(summary.report.is_success())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli.command) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
