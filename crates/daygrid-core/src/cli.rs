use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::analytics::DateRange;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "daygrid",
    version,
    about = "Half-hour day planner with per-category analytics",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "daygridrc", global = true)]
    pub daygridrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Day to work on: today, tomorrow, a weekday name, YYYY-MM-DD...
    #[arg(short = 'd', long = "date", default_value = "today", global = true)]
    pub date: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the day's 48 slots and who holds them
    Slots,
    /// Book slots for a new task
    Add {
        title: String,
        /// Slot start, e.g. "9:00 AM", 21:30 or 570; repeat for more slots
        #[arg(short, long = "slot", required = true)]
        slots: Vec<String>,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Replace a task's title, category and slots
    Edit {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        /// New slot set; omit to keep the current slots
        #[arg(short, long = "slot")]
        slots: Vec<String>,
    },
    /// Delete a task by id
    Delete { id: String },
    /// Delete every task touching the given slots on the day
    Clear {
        #[arg(short, long = "slot", required = true)]
        slots: Vec<String>,
    },
    /// List tasks in a date range
    List {
        #[arg(short, long, value_enum, default_value_t = DateRange::Day)]
        range: DateRange,
        #[arg(short, long, default_value = "All")]
        category: String,
        /// Only the N most recently created tasks
        #[arg(long)]
        recent: Option<usize>,
    },
    /// Summary cards and per-category hours/counts
    Stats {
        #[arg(short, long, value_enum, default_value_t = DateRange::Week)]
        range: DateRange,
        #[arg(short, long, default_value = "All")]
        category: String,
    },
    /// Month grid marking days with tasks
    Calendar {
        /// YYYY-MM; defaults to the month of --date
        #[arg(short, long)]
        month: Option<String>,
    },
    /// Import tasks saved by the earlier app (JSON array)
    ImportLegacy { file: PathBuf },
    /// Show the local profile
    Whoami,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
