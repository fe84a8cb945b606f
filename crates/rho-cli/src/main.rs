//! Binary entry point: argument parsing, wiring, and shutdown.

mod cli_args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use rho_engine::{
    CommandRegistry, ConnectionSupervisor, ErrorReporter, GreetingResponder, PausedChatGate,
    SocketConnectorConfig, SocketWireConnector, SupervisorRuntimeConfig, WireConnector,
};
use rho_plugins::install_builtin_commands;
use rho_session::SessionStore;
use rho_store::ChatStore;

use cli_args::Cli;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Funnels process-wide panics to the error reporter best-effort; the
/// default hook still prints the backtrace afterwards.
fn install_panic_report_hook(reporter: ErrorReporter) {
    let runtime = tokio::runtime::Handle::current();
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let detail = panic_info.to_string();
        let reporter = reporter.clone();
        runtime.spawn(async move {
            reporter.report(&detail, "panic").await;
        });
        default_hook(panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let session = SessionStore::new(cli.state_dir.join("session"));
    let store = ChatStore::open(&cli.state_dir.join("store.db"))
        .context("failed to open chat store")?;

    let registry = CommandRegistry::new();
    install_builtin_commands(&registry, &cli.handler_prefix)
        .context("failed to install built-in commands")?;
    println!("installed {} commands", registry.len());

    let reporter = ErrorReporter::new();
    install_panic_report_hook(reporter.clone());

    let backoff_schedule: Vec<Duration> = if cli.backoff_ms.is_empty() {
        SupervisorRuntimeConfig::default_backoff_schedule()
    } else {
        cli.backoff_ms
            .iter()
            .map(|millis| Duration::from_millis(*millis))
            .collect()
    };

    let connector =
        SocketWireConnector::new(SocketConnectorConfig::new(cli.endpoint.clone()));
    let supervisor = ConnectionSupervisor::new(SupervisorRuntimeConfig {
        connector: Arc::new(connector) as Arc<dyn WireConnector>,
        session,
        store,
        registry,
        gate: PausedChatGate::from_prefix_pattern(&cli.handler_prefix)?,
        reporter,
        greetings: GreetingResponder::new(cli.greetings),
        work_mode: cli.work_mode.into(),
        auto_read: cli.auto_read,
        auto_status_read: cli.auto_status_read,
        log_messages: cli.log_messages,
        backoff_schedule,
        max_reconnect_attempts: cli.max_reconnect_attempts,
        session_clear_cooldown: Duration::from_millis(cli.session_clear_cooldown_ms),
        startup_retry_delay: Duration::from_millis(cli.startup_retry_delay_ms),
    });

    if let Err(error) = supervisor.connect().await {
        eprintln!("initial connect failed; retrying in background: error={error:#}");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    println!("shutdown requested");
    supervisor
        .shutdown(Duration::from_millis(cli.shutdown_grace_ms))
        .await;
    Ok(())
}
