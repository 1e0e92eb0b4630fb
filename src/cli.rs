use crate::config::{RenameConfig, SplitHint};
use crate::metadata_retrieval::{OrderingVariant, TvdbCredentials};
use crate::naming::{DEFAULT_PART_SEPARATOR, DEFAULT_TEMPLATE, NUMBERED_TEMPLATE, NamingScheme};
use crate::sequencer::SortMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tv_rename")]
#[command(version)]
#[command(about = "Rename tv episode files into aired order, safely", long_about = None)]
pub struct Cli {
    /// Show debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Sort files lexicographically instead of naturally (ep10 before ep2)
    #[arg(short, long)]
    pub lexicographic: bool,

    /// Dry-run mode: show every rename without touching anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Extension of files to rename, repeatable [default: mkv, mp4, avi]
    #[arg(short = 'x', long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Rename without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Episode ordering of the local files
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    Aired,
    Dvd,
    Absolute,
    Streaming,
}

impl From<OrderArg> for OrderingVariant {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Aired => OrderingVariant::Aired,
            OrderArg::Dvd => OrderingVariant::Dvd,
            OrderArg::Absolute => OrderingVariant::Absolute,
            OrderArg::Streaming => OrderingVariant::Streaming,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rename the episodes of a series into aired order using TheTVDB
    Reorder {
        /// TheTVDB series id
        series_id: u64,

        /// Series directory containing the season directories
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Order the local files are in
        #[arg(short, long, value_enum, default_value_t = OrderArg::Aired)]
        order: OrderArg,

        /// Rename as many files as possible when local and remote counts differ
        #[arg(short, long)]
        ignore_mismatch: bool,

        /// Each file holds every episode sharing one position of the order
        #[arg(short, long)]
        combined: bool,

        /// Episode split across several files, e.g. S01E05=2 (repeatable)
        #[arg(short, long, value_name = "SxxEyy=N")]
        split: Vec<SplitHint>,

        /// File name template
        #[arg(short, long, default_value = DEFAULT_TEMPLATE)]
        template: String,

        /// Text between file name and part number
        #[arg(long, default_value = DEFAULT_PART_SEPARATOR)]
        part_separator: String,

        /// TheTVDB API key
        #[arg(long, env = "THETVDB_KEY", hide_env_values = true)]
        api_key: String,

        /// TheTVDB subscriber PIN
        #[arg(long, env = "THETVDB_PIN", hide_env_values = true)]
        pin: Option<String>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Number the episodes of season directories in sorted order
    Number {
        /// Season directories [default: every 'Season N' directory here]
        dirs: Vec<PathBuf>,

        /// Season number, for a directory not named 'Season N'
        #[arg(short, long)]
        season: Option<u32>,

        /// Show name [default: name of the parent directory]
        #[arg(long)]
        show: Option<String>,

        /// File name template
        #[arg(short, long, default_value = NUMBERED_TEMPLATE)]
        template: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Rename the directories of a series to 'Season N'
    Seasons {
        /// Series directory
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Number of the first season
        #[arg(short, long, default_value_t = 1)]
        start: u32,

        #[command(flatten)]
        common: CommonArgs,
    },
}

impl Commands {
    /// Options shared by every command
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Reorder { common, .. }
            | Commands::Number { common, .. }
            | Commands::Seasons { common, .. } => common,
        }
    }

    /// Builds the run configuration from the parsed arguments
    pub fn config(&self) -> RenameConfig {
        let common = self.common();
        let mut config = RenameConfig {
            sort_mode: if common.lexicographic {
                SortMode::Lexicographic
            } else {
                SortMode::Natural
            },
            dry_run: common.dry_run,
            ..RenameConfig::default()
        };
        if !common.extensions.is_empty() {
            config = config.with_extensions(&common.extensions);
        }

        match self {
            Commands::Reorder {
                order,
                ignore_mismatch,
                combined,
                split,
                template,
                part_separator,
                ..
            } => RenameConfig {
                variant: (*order).into(),
                ignore_mismatch: *ignore_mismatch,
                combined: *combined,
                split_hints: split.clone(),
                naming: NamingScheme {
                    template: template.clone(),
                    part_separator: part_separator.clone(),
                },
                ..config
            },
            Commands::Number {
                season,
                show,
                template,
                ..
            } => RenameConfig {
                season: *season,
                show_name: show.clone(),
                naming: NamingScheme::with_template(template.clone()),
                ..config
            },
            Commands::Seasons { start, .. } => RenameConfig {
                start_season: *start,
                ..config
            },
        }
    }

    /// TheTVDB credentials, for commands that need them
    pub fn credentials(&self) -> Option<TvdbCredentials> {
        match self {
            Commands::Reorder { api_key, pin, .. } => Some(TvdbCredentials {
                api_key: api_key.clone(),
                pin: pin.clone().filter(|p| !p.is_empty()),
            }),
            _ => None,
        }
    }
}
