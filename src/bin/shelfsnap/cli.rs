use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Library snapshot export and merge-restore
#[derive(Parser, Debug)]
#[command(name = "shelfsnap", version, about = "shelfsnap library snapshot CLI")]
pub struct Cli {
    /// Print process metrics as JSON after the command
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Which sources and trackers this install knows about.
#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    /// Catalog source the app can browse
    #[arg(long, default_value_t = 1)]
    pub primary_source: i64,
    /// Additional restorable source ids (repeatable)
    #[arg(long = "source")]
    pub sources: Vec<i64>,
    /// Tracker ids the user is logged in to (repeatable)
    #[arg(long = "logged-in")]
    pub logged_in: Vec<i32>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Write a snapshot of the library
    Backup {
        /// Library JSON file
        #[arg(long)]
        library: PathBuf,
        /// Explicit snapshot file
        #[arg(long, conflicts_with = "auto_dir", required_unless_present = "auto_dir")]
        out: Option<PathBuf>,
        /// Base directory for scheduled snapshots (retention applies)
        #[arg(long)]
        auto_dir: Option<PathBuf>,
        /// Inclusion flags, e.g. "categories,chapters" or "all"
        #[arg(long)]
        flags: Option<String>,
        #[command(flatten)]
        registry: RegistryArgs,
    },
    /// Merge a snapshot into the library
    Restore {
        #[arg(long)]
        library: PathBuf,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        registry: RegistryArgs,
    },
    /// Decode a snapshot and report its health
    Validate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        registry: RegistryArgs,
    },
    /// List snapshots in a directory, newest first
    List {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}
