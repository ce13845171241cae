//! ownmon: terminal client for the OwnMon activity backend.
//!
//! ## Subcommands
//!
//! - `dashboard` (default): live cards for current activity, media and today's counters
//! - `tail`: print every stream envelope as one JSON line
//! - `health`: query the backend's `/health` endpoint

mod app;
mod logging;
mod ui;

use clap::{Args, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ownmon_live::{load_config, ApiClient, LiveClient, LiveConfig, LiveError, Scheme};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::cell::Cell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{error, info, warn};

use crate::app::App;

#[derive(Parser)]
#[command(name = "ownmon")]
#[command(about = "Live view of OwnMon activity tracking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args)]
struct TargetArgs {
    /// Config file (defaults to ~/.ownmon/live.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Backend port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Use wss:// and https://
    #[arg(long, global = true)]
    wss: bool,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    reconnect_delay_ms: Option<u64>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Interactive dashboard
    Dashboard,

    /// Print stream envelopes as JSON lines
    Tail {
        /// Exit after this many envelopes
        #[arg(long, short = 'n')]
        count: Option<usize>,
    },

    /// Check that the backend is reachable
    Health,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Live(#[from] LiveError),

    #[error("Terminal error: {0}")]
    Terminal(#[from] io::Error),
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Dashboard);

    let _logging_guard = match command {
        Commands::Dashboard => {
            let guard = logging::init_file();
            logging::route_panics_to_log();
            guard
        }
        Commands::Tail { .. } | Commands::Health => {
            logging::init_stderr();
            None
        }
    };

    if let Err(err) = run(command, &cli.target) {
        error!(error = %err, "ownmon failed");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Commands, target: &TargetArgs) -> Result<(), CliError> {
    let config = resolve_config(target)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match command {
            Commands::Dashboard => dashboard(&config).await,
            Commands::Tail { count } => tail(&config, count).await,
            Commands::Health => health(&config).await,
        }
    })
}

/// File and environment first, then command-line flags.
fn resolve_config(target: &TargetArgs) -> Result<LiveConfig, LiveError> {
    let mut config = load_config(target.config.clone())?;
    if let Some(host) = &target.host {
        config.host = host.clone();
    }
    if let Some(port) = target.port {
        config.port = port;
    }
    if target.wss {
        config.scheme = Scheme::Wss;
    }
    if target.insecure {
        config.verify_tls = false;
    }
    if let Some(delay) = target.reconnect_delay_ms {
        config.reconnect_delay_ms = delay;
    }
    config.validate()?;
    Ok(config)
}

async fn dashboard(config: &LiveConfig) -> Result<(), CliError> {
    let app = App::new(config)?;
    info!(url = %config.stream_url(), "Starting dashboard");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app.run(&mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result.map_err(CliError::from)
}

async fn tail(config: &LiveConfig, count: Option<usize>) -> Result<(), CliError> {
    let mut client = LiveClient::new(config)?;
    let printed = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&printed);
    let _subscription = client.subscribe(move |envelope| match envelope.encode() {
        Ok(line) => {
            println!("{line}");
            counter.set(counter.get() + 1);
        }
        Err(err) => warn!(error = %err, kind = %envelope.kind(), "Failed to encode envelope"),
    });

    client.connect();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while !count.is_some_and(|limit| printed.get() >= limit) {
        tokio::select! {
            _ = client.step() => {}
            _ = &mut ctrl_c => break,
        }
    }

    client.disconnect();
    Ok(())
}

async fn health(config: &LiveConfig) -> Result<(), CliError> {
    let api = ApiClient::new(config)?;
    let health = api.health().await?;
    println!(
        "{} {} ({})",
        health.status,
        health.version,
        api.base_url()
    );
    Ok(())
}
