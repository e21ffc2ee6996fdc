use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use harmony::config::{Settings, SettingsOverrides};
use harmony::error::ErrorKind;
use harmony::lock::RepositoryLock;
use harmony::repository::Repository;

#[derive(Parser, Debug)]
#[command(name = "harmony", version)]
struct Cli {
    /// Print info-level log lines to stderr as well as the log file
    #[arg(short = 'v', long = "verbose", global = true, default_value_t = false)]
    verbose: bool,

    /// Digest algorithm for newly observed files (overrides HARMONY_DIGEST_ALGO)
    #[arg(long = "digest-algo", global = true)]
    digest_algo: Option<String>,

    /// Skip taking the advisory repository lock (overrides HARMONY_NO_LOCK)
    #[arg(long = "no-lock", global = true, default_value_t = false)]
    no_lock: bool,

    /// Network operation timeout in seconds (overrides HARMONY_TIMEOUT_SECS)
    #[arg(long = "timeout", global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a repository rooted at the current directory
    Init {
        #[arg(long = "name")]
        name: Option<String>,
    },

    /// Create a repository and pull state from an existing one
    Clone {
        uri: String,
        #[arg(long = "name")]
        name: Option<String>,
        target_dir: Option<PathBuf>,
    },

    /// Scan the working directory and record what changed
    Commit,

    /// Merge state from a remote, printing any conflicts
    PullState { remote: String },

    /// Fetch a single file's payload from a remote
    Get { path: String, remote: String },

    /// Show per-path status
    Status,

    /// Manage known remotes
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
}

#[derive(Subcommand, Debug)]
enum RemoteCommands {
    Add { name: String, uri: String },
    Remove { name: String },
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("harmony: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ErrorKind>() {
        Some(ErrorKind::NotARepository(_)) => 2,
        Some(ErrorKind::AlreadyInitialized(_)) => 3,
        Some(ErrorKind::RemoteUnreachable(_)) | Some(ErrorKind::ProtocolMismatch(_)) => 4,
        Some(ErrorKind::MergeConflict(_)) => 5,
        Some(ErrorKind::UnknownRemote(_)) | Some(ErrorKind::RemoteExists(_)) => 6,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let overrides = SettingsOverrides {
        digest_algo: cli.digest_algo,
        no_lock: cli.no_lock,
        timeout_secs: cli.timeout_secs,
    };
    let settings = Settings::resolve(overrides);

    let cwd = std::env::current_dir().context("resolve current directory")?;
    let take_lock = settings.take_lock;

    match cli.command {
        Commands::Init { name } => {
            let repo = Repository::init(&cwd, name.as_deref(), settings)?;
            harmony::logging::init_for_repository(repo.harmony_dir());
            let _lock = acquire_lock(repo.harmony_dir(), take_lock)?;
            println!("initialized repository {} at {}", repo.short_id(), cwd.display());
        }
        Commands::Clone { uri, name, target_dir } => {
            let target = target_dir.unwrap_or_else(|| default_clone_dir(&uri));
            std::fs::create_dir_all(&target).with_context(|| format!("create {}", target.display()))?;
            let (repo, conflicts) = Repository::clone(&target, &uri, name.as_deref(), settings).await?;
            harmony::logging::init_for_repository(repo.harmony_dir());
            let _lock = acquire_lock(repo.harmony_dir(), take_lock)?;
            println!("cloned {} into {}", uri, target.display());
            print_conflicts(&conflicts);
        }
        Commands::Commit => {
            let mut repo = resolve_repository(&cwd, settings, cli.verbose)?;
            let _lock = acquire_lock(repo.harmony_dir(), take_lock)?;
            let changed = repo.commit()?;
            println!("{}", if changed { "committed changes" } else { "nothing to commit" });
        }
        Commands::PullState { remote } => {
            let mut repo = resolve_repository(&cwd, settings, cli.verbose)?;
            let _lock = acquire_lock(repo.harmony_dir(), take_lock)?;
            let conflicts = repo.pull_state(&remote).await?;
            if conflicts.is_empty() {
                println!("merged state from {remote}");
            } else {
                print_conflicts(&conflicts);
                anyhow::bail!(ErrorKind::MergeConflict(conflicts.len()));
            }
        }
        Commands::Get { path, remote } => {
            let mut repo = resolve_repository(&cwd, settings, cli.verbose)?;
            let _lock = acquire_lock(repo.harmony_dir(), take_lock)?;
            repo.pull_file(&path, &remote).await?;
            println!("fetched {path} from {remote}");
        }
        Commands::Status => {
            let repo = resolve_repository(&cwd, settings, cli.verbose)?;
            print_status(&repo);
        }
        Commands::Remote { command } => {
            let mut repo = resolve_repository(&cwd, settings, cli.verbose)?;
            match command {
                RemoteCommands::Add { name, uri } => {
                    let _lock = acquire_lock(repo.harmony_dir(), take_lock)?;
                    repo.add_remote(&name, &uri)?;
                    println!("added remote {name} -> {uri}");
                }
                RemoteCommands::Remove { name } => {
                    let _lock = acquire_lock(repo.harmony_dir(), take_lock)?;
                    repo.remove_remote(&name)?;
                    println!("removed remote {name}");
                }
                RemoteCommands::List => {
                    for remote in repo.get_remotes() {
                        let label = remote.name.as_deref().unwrap_or("?");
                        let id = remote.id.as_deref().unwrap_or("(unknown)");
                        println!("{label}\t{id}\t{}", remote.location);
                    }
                }
            }
        }
    }
    Ok(())
}

/// A convenience wrapper around the facade (§5), not something the core
/// itself depends on: skipped entirely with `--no-lock`/`HARMONY_NO_LOCK`.
fn acquire_lock(harmony_dir: &std::path::Path, take_lock: bool) -> Result<Option<RepositoryLock>> {
    if !take_lock {
        return Ok(None);
    }
    Ok(Some(RepositoryLock::try_lock(harmony_dir)?))
}

fn resolve_repository(cwd: &std::path::Path, settings: Settings, verbose: bool) -> Result<Repository> {
    let repo = Repository::find(cwd, settings)?;
    if verbose {
        harmony::logging::init_for_repository(repo.harmony_dir());
    }
    Ok(repo)
}

fn default_clone_dir(uri: &str) -> PathBuf {
    let last = uri.trim_end_matches('/').rsplit('/').next().unwrap_or("repository");
    PathBuf::from(if last.is_empty() { "repository" } else { last })
}

fn print_conflicts(conflicts: &harmony::merge::Conflicts) {
    if conflicts.is_empty() {
        return;
    }
    println!("{} conflicting path(s):", conflicts.len());
    for (path, (local, remote)) in conflicts {
        println!(
            "  {path}: local={} remote={}",
            local.digest.as_deref().unwrap_or("(absent)"),
            remote.digest.as_deref().unwrap_or("(absent)"),
        );
    }
}

fn print_status(repo: &Repository) {
    println!("{:<40} {:>5} {:>5} {:>5} {:>5}", "path", "repo", "loc", "mod", "latest");
    for (path, status) in repo.get_file_stats() {
        println!(
            "{:<40} {:>5} {:>5} {:>5} {:>5}",
            path,
            bit(status.exists_in_repository),
            bit(status.exists_in_location_state),
            bit(status.maybe_modified),
            bit(status.is_most_recent),
        );
    }
}

fn bit(v: bool) -> &'static str {
    if v {
        "y"
    } else {
        "n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_cli_parses_name_flag() {
        let cli = Cli::try_parse_from(["harmony", "init", "--name", "demo"]).unwrap();
        match cli.command {
            Commands::Init { name } => assert_eq!(name.as_deref(), Some("demo")),
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn pull_state_cli_parses_remote() {
        let cli = Cli::try_parse_from(["harmony", "pull-state", "origin"]).unwrap();
        match cli.command {
            Commands::PullState { remote } => assert_eq!(remote, "origin"),
            _ => panic!("expected pull-state"),
        }
    }

    #[test]
    fn remote_add_cli_parses_name_and_uri() {
        let cli = Cli::try_parse_from(["harmony", "remote", "add", "origin", "ssh://host/path"]).unwrap();
        match cli.command {
            Commands::Remote {
                command: RemoteCommands::Add { name, uri },
            } => {
                assert_eq!(name, "origin");
                assert_eq!(uri, "ssh://host/path");
            }
            _ => panic!("expected remote add"),
        }
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from(["harmony", "--no-lock", "-v", "status"]).unwrap();
        assert!(cli.no_lock);
        assert!(cli.verbose);
    }
}
