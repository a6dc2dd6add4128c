use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{branch, cleanup, commit, diff, init, log, merge, revert, status, switch, sync};

#[derive(Parser)]
#[command(name = "minigit")]
#[command(version, about = "Local version control with branches and three-way merges", long_about = None)]
struct Cli {
    /// Work tree to operate on (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Author recorded on new commits
    #[arg(long, global = true, env = "MINIGIT_AUTHOR")]
    author: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository in the work tree
    Init {
        /// Name of the first branch
        #[arg(long, default_value = "main")]
        branch: String,

        /// Extra ignore pattern (repeatable)
        #[arg(short, long = "ignore")]
        ignore: Vec<String>,
    },

    /// Record the work tree as a new commit
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show the current branch and uncommitted changes
    Status,

    /// Show commit history of the current branch
    Log {
        /// Number of commits to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show line differences of working files
    Diff {
        /// File to diff (all changed files if omitted)
        path: Option<String>,

        /// Compare against this commit or branch instead of HEAD
        #[arg(long)]
        commit: Option<String>,
    },

    /// List, create or delete branches
    Branch {
        /// Branch to create (or delete with -d)
        name: Option<String>,

        /// Delete the named branch
        #[arg(short, long)]
        delete: bool,
    },

    /// Check out another branch
    Switch {
        /// Branch to switch to
        name: String,
    },

    /// Merge another branch into the current one
    Merge {
        /// Branch to merge
        source: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Finish a conflicted merge after editing the files
    Resolve {
        /// Commit message
        #[arg(short, long, default_value = "Resolve merge conflicts")]
        message: String,
    },

    /// List the conflicts a merge would produce, without merging
    DetectConflicts {
        /// Branch that would be merged
        source: String,
    },

    /// Abandon a conflicted merge
    MergeAbort,

    /// Restore a file to its committed content
    Revert {
        /// File to restore
        path: String,
    },

    /// Copy repository state to a remote directory
    Push {
        /// Remote directory (defaults to .minigit-remote in the work tree)
        #[arg(long)]
        remote: Option<PathBuf>,
    },

    /// Import repository state from a remote directory
    Pull {
        /// Remote directory (defaults to .minigit-remote in the work tree)
        #[arg(long)]
        remote: Option<PathBuf>,

        /// Write head files missing from the work tree after importing
        #[arg(long)]
        checkout: bool,
    },

    /// Delete the repository metadata, keeping the work tree
    Cleanup {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        report(&err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let repo = cli.repo;
    let author = cli.author;

    match cli.command {
        Commands::Init { branch, ignore } => {
            init::run(repo, branch, ignore)?;
        }
        Commands::Commit { message } => {
            commit::run(repo, message, author)?;
        }
        Commands::Status => {
            status::run(repo)?;
        }
        Commands::Log { limit } => {
            log::run(repo, limit)?;
        }
        Commands::Diff { path, commit } => {
            diff::run(repo, path, commit)?;
        }
        Commands::Branch { name, delete } => {
            branch::run(repo, name, delete)?;
        }
        Commands::Switch { name } => {
            switch::run(repo, name)?;
        }
        Commands::Merge { source, yes } => {
            merge::run(repo, source, yes, author)?;
        }
        Commands::Resolve { message } => {
            merge::resolve(repo, message, author)?;
        }
        Commands::DetectConflicts { source } => {
            merge::detect(repo, source)?;
        }
        Commands::MergeAbort => {
            merge::abort(repo)?;
        }
        Commands::Revert { path } => {
            revert::run(repo, path)?;
        }
        Commands::Push { remote } => {
            sync::push(repo, remote)?;
        }
        Commands::Pull { remote, checkout } => {
            sync::pull(repo, remote, checkout)?;
        }
        Commands::Cleanup { yes } => {
            cleanup::run(repo, yes)?;
        }
    }

    Ok(())
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<minigit_core::Error>() {
        Some(core) if core.is_corruption() => {
            eprintln!("{} {}", "repository corrupted:".red().bold(), core);
            eprintln!("{}", "The operation was stopped; no changes were made.".dimmed());
        }
        Some(core) => eprintln!("{} {}", "error:".red().bold(), core),
        None => eprintln!("{} {:#}", "error:".red().bold(), err),
    }
}
