//! Catalyst Center reconciliation CLI.
//!
//! Runs a task document against a controller and prints the run result as
//! JSON. Connection settings come from `CATALYST_*` environment variables,
//! overridden by flags.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use catalyst_core::State;
use catalyst_engine::{Engine, EngineConfig, TaskDocument};
use catalyst_transport::{HttpTransport, TransportConfig};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "catc")]
#[command(author, version, about = "Reconcile Catalyst Center against a task document", long_about = None)]
struct Args {
    /// Task document (YAML, or JSON with a `.json` extension)
    document: PathBuf,

    /// Controller host name or address
    #[arg(long)]
    host: Option<String>,

    /// Controller HTTPS port
    #[arg(long)]
    port: Option<u16>,

    /// API username
    #[arg(long, short)]
    username: Option<String>,

    /// API password
    #[arg(long)]
    password: Option<String>,

    /// Explicit base URL, overriding host and port
    #[arg(long)]
    base_url: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Override the document's state (merged, deleted, gathered)
    #[arg(long)]
    state: Option<State>,

    /// Re-check every record after the run
    #[arg(long)]
    verify_config: bool,

    /// Seconds before a controller task is reported as timed out
    #[arg(long)]
    task_timeout: Option<u64>,

    /// Directory for generated documents when gathering
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl Args {
    fn transport_config(&self) -> TransportConfig {
        let mut config = TransportConfig::from_env();
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(username) = &self.username {
            config.username.clone_from(username);
        }
        if let Some(password) = &self.password {
            config.password.clone_from(password);
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if self.insecure {
            config.verify = false;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = timeout;
        }
        config
    }

    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(timeout) = self.task_timeout {
            config.task_timeout_seconds = timeout;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries the result.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,catalyst=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the run succeeded.
async fn run(args: Args) -> anyhow::Result<bool> {
    let mut doc = TaskDocument::load(&args.document)
        .await
        .context("failed to load task document")?;
    if let Some(state) = args.state {
        doc.state = state;
    }
    if args.verify_config {
        doc.config_verify = true;
    }

    let config = args.transport_config();
    if config.base_url.is_none() && config.host.is_empty() {
        anyhow::bail!("no controller host given (use --host or CATALYST_HOST)");
    }
    let transport = HttpTransport::new(config).context("failed to build transport")?;
    let engine = Engine::new(Arc::new(transport), args.engine_config());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing the current record");
            let _ = cancel_tx.send(true);
        }
    });

    let result = engine.run_until(&doc, cancel_rx).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(!result.failed)
}
