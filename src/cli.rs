//! The CLI surface: a thin `clap` layer over [`crate::repo`],
//! [`crate::config`], and [`crate::hooks`]. All decision logic lives in the
//! library so it is testable without spawning a process.
use crate::config::Config;
use crate::error::GitalongError;
use crate::hooks;
use crate::repo::{ClaimOutcome, GitalongRepo, ReleaseOutcome};
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "gitalong", about = "Prevents concurrent edits to non-mergeable files across a team.")]
pub struct Cli {
    /// Run as if gitalong was started in this directory.
    #[arg(short = 'C', long = "directory", default_value = ".", global = true)]
    pub directory: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Writes `.gitalong.json` and prepares the store clone.
    Setup(SetupArgs),
    /// Publishes this clone's local state to the store.
    Update,
    /// Reports the commit-spread of each path.
    Status { paths: Vec<String> },
    /// Reserves exclusive edit rights to each path.
    Claim { paths: Vec<String> },
    /// Releases previously claimed paths.
    Release { paths: Vec<String> },
}

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Store locator: a Git remote URL, or an `https://` JSON-document endpoint.
    pub store_url: String,

    #[arg(long)]
    pub modify_permissions: bool,

    #[arg(long, value_delimiter = ',')]
    pub tracked_extensions: Vec<String>,

    #[arg(long)]
    pub track_uncommitted: bool,

    #[arg(long)]
    pub update_gitignore: bool,

    #[arg(long)]
    pub update_hooks: bool,

    /// `Key=Value` header sent with every JSON-store request; repeatable.
    #[arg(long = "store-header", value_parser = parse_header)]
    pub store_headers: Vec<(String, String)>,

    #[arg(long, default_value_t = 5)]
    pub pull_threshold: u64,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected `Key=Value`, got `{s}`"))
}

/// Runs the parsed command against the repository at `cli.directory`.
/// Returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    match dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("gitalong: {e}");
            tracing::debug!(error = ?e, "command failed");
            1
        }
    }
}

fn dispatch(cli: &Cli) -> Result<i32, GitalongError> {
    match &cli.command {
        Command::Setup(args) => {
            run_setup(&cli.directory, args)?;
            Ok(0)
        }
        Command::Update => {
            GitalongRepo::open(&cli.directory)?.update()?;
            Ok(0)
        }
        Command::Status { paths } => {
            let repo = GitalongRepo::open(&cli.directory)?;
            for entry in repo.status(paths)? {
                println!(
                    "{} {} {} {} {} {} {}",
                    entry.spread,
                    entry.path,
                    entry.sha,
                    entry.local_branches.join(","),
                    entry.remote_branches.join(","),
                    entry.host,
                    entry.author,
                );
            }
            Ok(0)
        }
        Command::Claim { paths } => {
            let repo = GitalongRepo::open(&cli.directory)?;
            let outcomes = repo.claim(paths)?;
            let mut all_ok = true;
            for (path, outcome) in paths.iter().zip(outcomes) {
                match outcome {
                    ClaimOutcome::Claimed => println!("{path}: claimed"),
                    ClaimOutcome::Blocked(record) => {
                        all_ok = false;
                        println!("{path}: blocked by {}/{}", record.host, record.author);
                    }
                    ClaimOutcome::Failed(msg) => {
                        all_ok = false;
                        println!("{path}: failed ({msg})");
                    }
                }
            }
            Ok(if all_ok { 0 } else { 1 })
        }
        Command::Release { paths } => {
            let repo = GitalongRepo::open(&cli.directory)?;
            let outcomes = repo.release(paths)?;
            let mut all_ok = true;
            for (path, outcome) in paths.iter().zip(outcomes) {
                match outcome {
                    ReleaseOutcome::Released => println!("{path}: released"),
                    ReleaseOutcome::StillDirty => {
                        all_ok = false;
                        println!("{path}: still modified locally, run `update` first");
                    }
                    ReleaseOutcome::Failed(msg) => {
                        all_ok = false;
                        println!("{path}: failed ({msg})");
                    }
                }
            }
            Ok(if all_ok { 0 } else { 1 })
        }
    }
}

fn run_setup(repo_root: &Path, args: &SetupArgs) -> Result<(), GitalongError> {
    tracing::info!(store = %args.store_url, "setup: start");
    let config = Config {
        store_url: args.store_url.clone(),
        store_headers: args.store_headers.iter().cloned().collect::<HashMap<_, _>>(),
        modify_permissions: args.modify_permissions,
        tracked_extensions: args.tracked_extensions.clone(),
        track_uncommitted: args.track_uncommitted,
        pull_threshold: args.pull_threshold,
    };
    config.save(repo_root)?;

    if args.update_gitignore {
        hooks::update_gitignore(repo_root)?;
    }
    if args.update_hooks {
        hooks::install_hooks(repo_root)?;
    }

    // Touches the store backend once so a bad store URL fails `setup` loudly
    // rather than silently on the first `update`.
    GitalongRepo::open(repo_root)?.update()?;

    tracing::info!("setup: done");
    Ok(())
}
