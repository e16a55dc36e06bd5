mod handlers;

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vulnwatch_core::client::SnykClient;
use vulnwatch_core::poll::{PollError, Poller};
use vulnwatch_core::store::MetricsStore;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(
    name = "vulnwatch",
    about = "Prometheus exporter for Snyk vulnerability counts",
    version = vulnwatch_core::VERSION
)]
struct Args {
    /// Base URL of the Snyk v1 API.
    #[arg(
        long,
        default_value = "https://snyk.io/api/v1",
        env = "VULNWATCH_API_URL"
    )]
    api_url: String,

    /// API token with read access to the polled organizations.
    #[arg(long, env = "VULNWATCH_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Organization ID to poll. Repeatable; polls every organization
    /// visible to the token when omitted.
    #[arg(
        long = "organization",
        env = "VULNWATCH_ORGANIZATIONS",
        value_delimiter = ','
    )]
    organizations: Vec<String>,

    /// Seconds between polls of the API. Must be at least 1.
    #[arg(
        long,
        default_value = "600",
        env = "VULNWATCH_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Per-request timeout in seconds.
    #[arg(long, default_value = "10", env = "VULNWATCH_TIMEOUT")]
    timeout: u64,

    /// Listen address.
    #[arg(long, default_value = "0.0.0.0:9532", env = "VULNWATCH_LISTEN")]
    listen: String,
}

// ============================================================
// Main
// ============================================================

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vulnwatch=info,vulnwatch_core=info".parse().unwrap()),
        )
        .init();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main(args));
}

async fn async_main(args: Args) {
    info!(
        version = vulnwatch_core::VERSION,
        api_url = %args.api_url,
        interval_s = args.interval,
        timeout_s = args.timeout,
        "starting"
    );

    let client = match SnykClient::new(
        &args.api_url,
        &args.api_token,
        Duration::from_secs(args.timeout),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build API client");
            process::exit(1);
        }
    };

    let store = Arc::new(MetricsStore::new().expect("failed to register metrics"));
    let poller =
        Poller::new(client, store.clone()).with_org_filter(args.organizations.clone());

    // An allow-list that matches no organization is a configuration error
    // and must fail before the server answers its first probe. A transport
    // failure here is not conclusive; the poll loop retries it.
    if !args.organizations.is_empty() {
        match poller.resolve_organizations().await {
            Ok(organizations) => {
                info!(matched = organizations.len(), "organization filter validated");
            }
            Err(e @ PollError::NoOrganizations { .. }) => {
                error!(error = %e, "organization filter validation failed");
                process::exit(1);
            }
            Err(PollError::Client(e)) => {
                warn!(error = %e, "organization listing failed, starting unready");
            }
        }
    }

    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    let poller_cancel = cancel.clone();
    let interval = Duration::from_secs(args.interval);
    let poller_task = tokio::spawn(async move {
        let result = poller.run(poller_cancel.clone(), interval).await;
        if result.is_err() {
            // A fatal poller error must also stop the server.
            poller_cancel.cancel();
        }
        result
    });

    let app = Router::new()
        .route("/metrics", get(handlers::handle_metrics))
        .route("/healthz", get(handlers::handle_healthz))
        .route("/ready", get(handlers::handle_ready))
        .with_state(store.clone());

    let addr: SocketAddr = args.listen.parse().expect("invalid listen address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    info!(%addr, "listening");

    let mut failed = false;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
    {
        error!(error = %e, "server error");
        failed = true;
    }
    cancel.cancel();

    match poller_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "poller failed");
            failed = true;
        }
        Err(e) => {
            error!(error = %e, "poller task panicked");
            failed = true;
        }
    }

    info!("shutdown complete");
    if failed {
        process::exit(1);
    }
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

// ============================================================
// Tests
// ============================================================
