//! Serpens xtask
//!
//! ```bash
//! cargo xtask check            # fmt, clippy, tests
//! cargo xtask test [FILTER]
//! cargo xtask fmt
//! cargo xtask release
//! cargo xtask smoke --host ssh://pi@rpi4
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development tasks for the Serpens swarm bootstrapper")]
struct Cli {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Formatting check, clippy with warnings denied, then the test suite
    Check,
    /// Run the test suite, optionally filtered by test name
    Test { filter: Option<String> },
    /// Format the workspace
    Fmt,
    /// Build the release binary and print its path
    Release,
    /// Read-only run of the release binary against a live engine
    Smoke {
        /// Engine host passed through as DOCKER_HOST
        #[arg(long)]
        host: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    let root = workspace_root()?;
    sh.change_dir(&root);

    match cli.command {
        Task::Check => {
            cmd!(sh, "cargo fmt --all -- --check").run()?;
            cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
            test(&sh, None)?;
        }
        Task::Test { filter } => test(&sh, filter.as_deref())?,
        Task::Fmt => cmd!(sh, "cargo fmt --all").run()?,
        Task::Release => {
            let binary = release(&sh, &root)?;
            println!("{}", binary.display());
        }
        Task::Smoke { host } => smoke(&sh, &root, host.as_deref())?,
    }

    Ok(())
}

/// The directory holding this xtask's parent workspace
fn workspace_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask manifest has no parent directory")
}

fn test(sh: &Shell, filter: Option<&str>) -> Result<()> {
    let filter: Vec<&str> = filter.into_iter().collect();
    cmd!(sh, "cargo test -p serpens -- {filter...}").run()?;
    Ok(())
}

fn release(sh: &Shell, root: &Path) -> Result<PathBuf> {
    cmd!(sh, "cargo build --release --bin serpens").run()?;
    let binary = root.join("target").join("release").join("serpens");
    if !binary.exists() {
        bail!("release build did not produce {}", binary.display());
    }
    Ok(binary)
}

/// `status` and `nodes` only read cluster state, so this is safe on a live swarm
fn smoke(sh: &Shell, root: &Path, host: Option<&str>) -> Result<()> {
    let binary = release(sh, root)?;
    let _host = host.map(|host| sh.push_env("DOCKER_HOST", host));

    cmd!(sh, "{binary} --json status").run()?;
    if cmd!(sh, "{binary} nodes").run().is_err() {
        println!("nodes unavailable: this host is not a swarm manager");
    }
    Ok(())
}
