//! `conductor` -- runs an HTTP service under signal-driven lifecycle control.
//!
//! Composition:
//! - root group: `SignalRouter`
//! - `http` group: `HttpService`, `StaticFileService` when `"static"` is
//!   configured, and a `/health` route over the whole hierarchy
//!
//! SIGINT and SIGTERM stop the process, SIGHUP is logged, SIGPIPE is ignored.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use conductor_core::{ConfigStore, EmptyConfigStore, Group, JsonConfigStore};
use conductor_server::network::health_route;
use conductor_server::{
    init_tracing, HttpService, LogFormat, Signal, SignalRouter, StaticFileService,
};
use tokio::sync::Notify;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Lifecycle-managed HTTP server")]
struct Args {
    /// JSON configuration stream (concatenated objects).
    #[arg(long, env = "CONDUCTOR_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "CONDUCTOR_LOG_FORMAT")]
    log_format: LogFormat,

    /// Filter directives used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "CONDUCTOR_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_tracing(args.log_format, &args.log_level) {
        eprintln!("conductor: failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("conductor exited with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let store: Arc<dyn ConfigStore> = match &args.config {
        Some(path) => Arc::new(JsonConfigStore::open_path(path)?),
        None => Arc::new(EmptyConfigStore),
    };
    let serve_static = store.contains("static");

    let root = Group::root_with_config("conductor", store);
    root.add_service::<SignalRouter>()?;
    let http = Group::child("http", &root);
    http.add_service::<HttpService>()?;
    if serve_static {
        http.add_service::<StaticFileService>()?;
    }
    root.compose()?;

    let shutdown = Arc::new(Notify::new());
    let router = root.resolve::<SignalRouter>()?;
    for signal in [Signal::Interrupt, Signal::Terminate] {
        let shutdown = Arc::clone(&shutdown);
        router.handle(signal, move |signal| {
            info!(%signal, "shutdown requested");
            shutdown.notify_one();
        })?;
    }
    router.handle(Signal::Hangup, |signal| {
        info!(%signal, "hangup received, configuration is not reloaded");
    })?;
    router.ignore(Signal::Pipe)?;

    http.resolve::<HttpService>()?
        .register("/health", health_route(Arc::clone(root.context())))?;

    root.configure().await?;
    root.start().await?;
    if let Some(addr) = http.resolve::<HttpService>()?.local_addr() {
        info!(%addr, "conductor running");
    }

    let mut token = root.context().token();
    tokio::select! {
        () = shutdown.notified() => {}
        () = token.cancelled() => {}
    }

    root.stop().await?;
    info!("conductor stopped");
    Ok(())
}
