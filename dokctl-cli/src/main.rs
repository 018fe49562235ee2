mod app;
mod http;
mod logging;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ Context, bail };
use chrono::{ TimeZone, Utc };
use clap::{ Parser, Subcommand };
use tracing::info;

use dokctl_core::cache::LocalCache;
use dokctl_core::clock::SystemClock;
use dokctl_core::config::{ ConfigError, ServersConfig };
use dokctl_core::service::MemoryService;
use dokctl_core::session::{ Connection, Session };

use app::ConfigConnector;

#[derive(Parser)]
#[command(name = "dokctl", version)]
#[command(about = "Terminal client for self-hosted deployment platforms", long_about = None)]
struct Cli {
    /// Servers file (defaults to $DOKCTL_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log file (defaults to the user data dir)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Server alias to start with instead of the current one
    #[arg(long)]
    server: Option<String>,

    /// Run against built-in sample data
    #[arg(long)]
    demo: bool,

    /// Auto refresh interval in milliseconds
    #[arg(long, default_value_t = 5000)]
    interval: u64,

    #[arg(long)]
    no_auto_refresh: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Tui,
    /// Inspect or clear the local snapshot cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// List configured servers
    Servers,
}

#[derive(Clone, Copy, Subcommand)]
enum CacheCommand {
    Stats,
    Clear,
}

fn config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Ok(ServersConfig::default_path()?),
    }
}

fn open_cache() -> anyhow::Result<LocalCache> {
    let path = LocalCache::default_path().context("cannot determine a cache directory")?;
    Ok(LocalCache::open(path, SystemClock::shared()))
}

fn run_cache(command: CacheCommand) -> anyhow::Result<()> {
    let cache = open_cache()?;
    match command {
        CacheCommand::Stats => {
            let stats = cache.stats();
            if let Some(path) = cache.path() {
                println!("Cache file:        {}", path.display());
            }
            println!("Project entries:   {}", stats.project_entries);
            println!("Resource entries:  {}", stats.resource_entries);
            println!("Valid entries:     {}", stats.valid_entries);
            match stats.oldest_timestamp.and_then(|ts| Utc.timestamp_millis_opt(ts).single()) {
                Some(oldest) => println!("Oldest entry:      {}", oldest.to_rfc3339()),
                None => println!("Oldest entry:      -"),
            }
        }
        CacheCommand::Clear => {
            cache.clear();
            println!("Cache cleared");
        }
    }
    Ok(())
}

fn run_servers(cli: &Cli) -> anyhow::Result<()> {
    let path = config_path(cli)?;
    let config = ServersConfig::load(&path)?;
    let current = config.active().map(|(alias, _)| alias.to_string());
    if config.servers.is_empty() {
        println!("No servers configured in {}", path.display());
        return Ok(());
    }
    for (alias, server) in &config.servers {
        let mark = if current.as_deref() == Some(alias.as_str()) { "*" } else { " " };
        println!("{} {:<16} {}", mark, alias, server.server_url);
    }
    Ok(())
}

fn demo_session() -> Session {
    let clock = SystemClock::shared();
    let connection = Connection {
        alias: "demo".into(),
        service: Arc::new(MemoryService::demo()),
        default_project_id: None,
    };
    Session::new(connection, Arc::new(LocalCache::in_memory(clock.clone())), clock)
}

fn connected_session(cli: &Cli) -> anyhow::Result<Session> {
    let path = config_path(cli)?;
    let config = ServersConfig::load(&path)?;
    if config.servers.is_empty() {
        bail!(ConfigError::NoServers(path));
    }
    let alias = match &cli.server {
        Some(alias) => alias.clone(),
        None =>
            config
                .active()
                .map(|(alias, _)| alias.to_string())
                .ok_or_else(|| ConfigError::NoServers(path.clone()))?,
    };

    let connector = Arc::new(ConfigConnector::new(path, config));
    let connection = connector.open(&alias)?;
    info!(alias = %alias, "connecting");

    let clock = SystemClock::shared();
    let cache = match LocalCache::default_path() {
        Some(cache_path) => LocalCache::open(cache_path, clock.clone()),
        None => LocalCache::in_memory(clock.clone()),
    };
    let session = Session::new(connection, Arc::new(cache), clock);
    session.set_connector(connector);
    Ok(session)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_path = cli.log_file.clone().unwrap_or_else(logging::default_log_path);
    logging::init(&log_path)?;

    match &cli.command {
        Some(Commands::Cache(command)) => {
            return run_cache(*command);
        }
        Some(Commands::Servers) => {
            return run_servers(&cli);
        }
        Some(Commands::Tui) | None => {
            // Fall through to TUI
        }
    }

    let session = if cli.demo { demo_session() } else { connected_session(&cli)? };
    info!(server = %session.snapshot().server_alias, demo = cli.demo, "starting tui");
    app::run(session, !cli.no_auto_refresh, Duration::from_millis(cli.interval)).await
}
