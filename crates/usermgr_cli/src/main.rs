//! Console entry point for the user manager.
//!
//! # Responsibility
//! - Resolve configuration from flags and environment.
//! - Bootstrap logging and storage, then hand control to the menu loop.

mod console;

use anyhow::{Context, Result};
use clap::Parser;
use console::Console;
use log::info;
use std::io;
use std::path::{Path, PathBuf};
use usermgr_core::db::{open_db, open_db_in_memory};
use usermgr_core::{core_version, default_log_level, init_logging, SqliteUserRepository, UserService};

#[derive(Parser, Debug)]
#[command(name = "usermgr")]
#[command(about = "Create, find, update, delete and list users from the console.")]
#[command(version)]
struct Cli {
    #[arg(
        long,
        env = "USERMGR_DB",
        default_value = "usermgr.sqlite3",
        help = "SQLite database file, created on first use"
    )]
    db: PathBuf,

    #[arg(long, help = "Use a throwaway in-memory database instead of --db")]
    memory: bool,

    #[arg(
        long,
        env = "USERMGR_LOG_LEVEL",
        help = "trace|debug|info|warn|error (default depends on build mode)"
    )]
    log_level: Option<String>,

    #[arg(
        long,
        env = "USERMGR_LOG_DIR",
        help = "Directory for rolling log files; logging is off when unset"
    )]
    log_dir: Option<PathBuf>,
}

impl Cli {
    /// Explicit `--log-level`, else the build-mode default.
    fn effective_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let log_dir = absolute_dir(log_dir)?;
        init_logging(cli.effective_log_level(), &log_dir).map_err(anyhow::Error::msg)?;
    }

    let conn = if cli.memory {
        open_db_in_memory().context("failed to open in-memory database")?
    } else {
        open_db(&cli.db)
            .with_context(|| format!("failed to open database `{}`", cli.db.display()))?
    };
    let service = UserService::new(SqliteUserRepository::try_new(&conn)?);

    info!(
        "event=console_start module=cli status=ok version={} memory={}",
        core_version(),
        cli.memory
    );
    let stdin = io::stdin();
    let stdout = io::stdout();
    let _stdout = Console::new(stdin.lock(), stdout.lock(), &service).run()?;
    info!("event=console_exit module=cli status=ok");

    Ok(())
}

fn absolute_dir(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    Ok(cwd.join(path))
}
