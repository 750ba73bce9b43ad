//! Quarry server entry point.
//!
//! Loads configuration, starts the server, and blocks until a shutdown
//! signal arrives (or `stop` is typed on the console when not headless).

mod cli;
mod config;
mod signals;

use anyhow::Context;
use quarry_server::GameServer;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};

fn setup_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if settings.json_format {
        registry
            .with(fmt::layer().json().with_thread_names(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_thread_names(true))
            .init();
    }
}

/// Resolves when `stop` is typed on stdin. Pending forever in headless
/// mode or when stdin closes.
async fn wait_for_console_stop(headless: bool) {
    if headless {
        std::future::pending::<()>().await;
        return;
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "stop" => {
                    info!("Console requested stop");
                    return;
                }
                "" => {}
                other => warn!("Unknown console command {other:?} (try \"stop\")"),
            },
            // Stdin closed; only signals can stop us now.
            Ok(None) | Err(_) => std::future::pending::<()>().await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let mut app_config = AppConfig::load_or_create(&args.config_path).await?;

    if let Some(bind) = args.bind_address {
        app_config.server.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        app_config.logging.level = level;
    }
    if args.json_logs {
        app_config.logging.json_format = true;
    }
    setup_logging(&app_config.logging);

    info!(
        "Quarry v{} starting (config {})",
        env!("CARGO_PKG_VERSION"),
        args.config_path.display()
    );

    let handle = GameServer::new(app_config.server)
        .start()
        .await
        .context("failed to start server")?;
    info!("Ready on {}; press Ctrl+C to stop", handle.local_addr());

    tokio::select! {
        result = signals::wait_for_shutdown_signal() => result?,
        () = wait_for_console_stop(args.headless) => {}
    }

    handle.stop().await.context("shutdown failed")?;
    Ok(())
}
