//! phonelink
//!
//! Spawns bitlite, waits for it to announce the phone's address, opens a
//! WebSocket link to the phone and relays operator input to both.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use phonelink::console::OperatorConsole;
use phonelink::coordinator::{self, Coordinator, StdTerminal, Terminal};
use phonelink::discovery::DiscoveryScanner;
use phonelink::event;
use phonelink::link::WsConnector;
use phonelink::subprocess::ProcessSupervisor;
use phonelink_core::Config;

#[derive(Parser, Debug)]
#[command(name = "phonelink")]
#[command(version, about = "Relay console input to bitlite and the phone it discovers")]
struct Args {
    /// Path to the bitlite binary
    #[arg(long)]
    process_bin: Option<PathBuf>,

    /// Seconds to wait for the endpoint announcement (0 waits forever)
    #[arg(long)]
    discovery_timeout: Option<u64>,

    /// Seconds to wait for the WebSocket handshake
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Ceiling in bytes for output held back during discovery
    #[arg(long)]
    max_pending_bytes: Option<usize>,

    /// First message sent once the link opens
    #[arg(long)]
    greeting: Option<String>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(bin) = self.process_bin {
            config.process.binary = bin;
        }
        if let Some(secs) = self.discovery_timeout {
            config.discovery.timeout_secs = secs;
        }
        if let Some(secs) = self.connect_timeout {
            config.link.connect_timeout_secs = secs;
        }
        if let Some(bytes) = self.max_pending_bytes {
            config.discovery.max_pending_bytes = bytes;
        }
        if let Some(greeting) = self.greeting {
            config.link.greeting = greeting;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if self.log_json {
            config.log.json = true;
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let cwd = std::env::current_dir().ok();
    let mut config = phonelink_core::config::load_config(cwd.as_deref())?;
    args.apply(&mut config);

    let log_filter = format!("phonelink={}", config.log.level);
    phonelink_core::tracing_init::init_tracing(&log_filter, config.log.json);

    // One thread: every event is handled on the coordinator's task.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let code = runtime.block_on(run(config));
    // Blocking stdin reads cannot be cancelled; do not wait for them.
    runtime.shutdown_background();
    Ok(code)
}

async fn run(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        binary = %config.process.binary.display(),
        "Starting phonelink"
    );

    let mut terminal = StdTerminal;
    let (events_tx, events_rx) = event::channel();

    let process = match ProcessSupervisor::spawn(
        &config.process.binary,
        config.process.display_name(),
        events_tx.clone(),
    ) {
        Ok(process) => process,
        Err(e) => {
            error!(error = %e, "Failed to start supervised process");
            terminal.err(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    OperatorConsole::stdin().spawn(events_tx.clone());
    if let Some(timeout) = config.discovery.timeout() {
        coordinator::schedule_discovery_timeout(timeout, events_tx.clone());
    }

    let coordinator = Coordinator::new(
        process,
        DiscoveryScanner::new(config.discovery.max_pending_bytes),
        Box::new(WsConnector::new(config.link.connect_timeout())),
        terminal,
        events_tx,
        config.link,
    );

    tokio::select! {
        code = coordinator.run(events_rx) => exit_code(code),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping");
            ExitCode::from(130)
        }
    }
}

/// Mirror the supervised process's exit code; a signal exit maps to 1.
fn exit_code(code: Option<i32>) -> ExitCode {
    code.and_then(|c| u8::try_from(c).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
