//! Tracing setup. The TUI owns the terminal, so everything goes to a file.

use std::fs::{ File, OpenOptions };
use std::path::{ Path, PathBuf };
use std::sync::Arc;

use anyhow::{ Context, Result };
use tracing_subscriber::prelude::*;
use tracing_subscriber::{ EnvFilter, fmt };

const DEFAULT_FILTER: &str = "info";

/// `<data dir>/dokctl/dokctl.log`, or the temp dir if there is no data dir.
pub fn default_log_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("dokctl")
        .join("dokctl.log")
}

fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

/// `RUST_LOG` if set, `info` otherwise.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init(path: &Path) -> Result<()> {
    let file = open_log(path)?;
    let fmt_layer = fmt::layer().with_writer(Arc::new(file)).with_ansi(false).with_target(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}
