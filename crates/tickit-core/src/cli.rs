use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::Priority;
use crate::view::{PriorityFilter, SortMode, StatusFilter};

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
    name = "tickit",
    version,
    about = "tickit: a personal task list with optional AI help",
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

    /// Read settings from this file instead of ~/.tickitrc.
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Keep task data in this directory.
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add(AddArgs),
    /// Show the filtered, sorted task list (the default).
    List(ListArgs),
    /// Show every field of one task.
    Show { id: String },
    /// Change fields of a task.
    Edit(EditArgs),
    /// Mark a task completed.
    Done { id: String },
    /// Mark a completed task open again.
    Undo { id: String },
    /// Delete a task after confirmation.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
    /// Edit the checklist of a task.
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    /// Ask the AI for a priority and apply it.
    Suggest { id: String },
    /// Ask the AI to break a task into subtasks.
    Breakdown { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(short = 'd', long = "description")]
    pub description: Option<String>,

    #[arg(short = 'p', long = "priority", value_enum)]
    pub priority: Option<Priority>,

    /// YYYY-MM-DD, today, tomorrow, a weekday, or +Nd / +Nw.
    #[arg(long = "due")]
    pub due: Option<String>,

    #[arg(short = 't', long = "tag", action = ArgAction::Append)]
    pub tags: Vec<String>,

    #[arg(short = 's', long = "subtask", action = ArgAction::Append)]
    pub subtasks: Vec<String>,

    /// Let the AI pick the priority.
    #[arg(long = "suggest-priority")]
    pub suggest_priority: bool,

    /// Let the AI add subtasks after creating the task.
    #[arg(long = "breakdown")]
    pub breakdown: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[arg(long = "status", value_enum)]
    pub status: Option<StatusFilter>,

    #[arg(short = 'p', long = "priority", value_enum)]
    pub priority: Option<PriorityFilter>,

    #[arg(long = "sort", value_enum)]
    pub sort: Option<SortMode>,

    /// Case-insensitive text to look for in titles and descriptions.
    #[arg(short = 's', long = "search")]
    pub search: Option<String>,

    #[arg(short = 't', long = "tag")]
    pub tag: Option<String>,

    /// Print the view as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,

    #[arg(long = "title")]
    pub title: Option<String>,

    /// An empty value clears the description.
    #[arg(short = 'd', long = "description")]
    pub description: Option<String>,

    #[arg(short = 'p', long = "priority", value_enum)]
    pub priority: Option<Priority>,

    #[arg(long = "due", conflicts_with = "no_due")]
    pub due: Option<String>,

    #[arg(long = "no-due")]
    pub no_due: bool,

    /// Add a tag.
    #[arg(short = 't', long = "tag", action = ArgAction::Append)]
    pub tags: Vec<String>,

    /// Remove a tag.
    #[arg(long = "untag", action = ArgAction::Append)]
    pub untags: Vec<String>,

    #[arg(long = "clear-tags")]
    pub clear_tags: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    /// Append a subtask.
    Add {
        id: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Flip a subtask between open and done.
    Toggle { id: String, subtask: String },
    /// Remove a subtask.
    Remove { id: String, subtask: String },
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

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
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
                debug!(key = %k, "captured positional rc override");
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
