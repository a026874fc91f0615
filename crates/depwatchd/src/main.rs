//! depwatchd: monitor the dependencies listed in a TOML file.
//!
//! # Usage
//!
//! ```text
//! depwatchd run --config /etc/depwatch/depwatch.toml
//! depwatchd validate --config depwatch.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use depwatchd::settings::Settings;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "depwatchd", about = "Dependency health monitor")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start monitoring and serve /metrics and /health.
    Run {
        /// Path to the TOML configuration.
        #[arg(long, short)]
        config: PathBuf,

        /// Listen address, overriding the file.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Check a configuration file and exit.
    Validate {
        /// Path to the TOML configuration.
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { config, listen } => run(config, listen).await,
        Command::Validate { config } => validate(config),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,depwatch=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn validate(path: PathBuf) -> anyhow::Result<()> {
    let settings = Settings::from_file(&path)?;
    let plan = settings.plan()?;
    println!(
        "{}: ok ({} dependencies, {} endpoints)",
        path.display(),
        plan.dependencies.len(),
        plan.endpoint_count()
    );
    Ok(())
}

async fn run(path: PathBuf, listen: Option<String>) -> anyhow::Result<()> {
    let settings = Settings::from_file(&path)?;
    let addr: SocketAddr = listen
        .as_deref()
        .unwrap_or(&settings.listen)
        .parse()
        .context("invalid listen address")?;
    let plan = settings.plan()?;
    info!(
        instance = %plan.instance,
        dependencies = plan.dependencies.len(),
        endpoints = plan.endpoint_count(),
        "depwatchd starting"
    );

    let state = depwatchd::assemble(plan).await?;
    let scheduler = state.scheduler.clone();
    scheduler.start().await?;

    let router = depwatchd::api::build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "HTTP server listening");

    // Graceful shutdown on Ctrl-C.
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await;

    scheduler.stop().await;
    served?;

    info!("depwatchd stopped");
    Ok(())
}
