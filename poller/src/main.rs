use axum::{routing::get, Router};
use clap::Parser;
use poller::config::{Args, Settings};
use poller::db::{self, PgStore, TelemetryStore};
use poller::errors::{FetchError, Result};
use poller::fetcher::TelemetryFetcher;
use poller::metrics;
use poller::notifier::{AlertNotifier, SentAlerts, SmtpMailer};
use poller::poll::{self, Collector};
use poller::rest;
use poller::retry::RetryPolicy;
use poller::token::TokenProvider;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(args).await {
        error!("Poller failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Starting telemetry poller");
    info!("Database: {}", args.database_url.split('@').last().unwrap_or("***"));

    metrics::init_metrics()?;

    let pool = db::make_pool(&args.database_url).await?;
    let store = PgStore::new(pool);

    let params = match store.load_parameters().await {
        Ok(params) => params,
        Err(e) => {
            warn!("Could not read system parameters, using CLI/env only: {}", e);
            Default::default()
        }
    };
    let settings = Settings::resolve(args, &params)?;

    info!("Thing: {}", settings.thing_id);
    info!(
        "Poll interval: {:?}, fetch attempts: {}, retry wait: {:?}",
        settings.poll_interval, settings.fetch_attempts, settings.fetch_retry_wait
    );

    let client = reqwest::Client::builder()
        .timeout(settings.fetch_timeout)
        .build()?;
    let tokens = TokenProvider::new(client.clone(), settings.credentials.clone());
    let retry = RetryPolicy::fixed(
        settings.fetch_attempts,
        settings.fetch_retry_wait,
        FetchError::is_retryable,
    );
    let fetcher = TelemetryFetcher::new(client, tokens, settings.properties_url.clone(), retry);

    // Lives for the whole process; shared by the poll loop and /data.
    let sent_alerts = SentAlerts::new();
    let mailer = Arc::new(SmtpMailer::new(&settings.smtp)?);
    let notifier = Arc::new(AlertNotifier::new(mailer, sent_alerts));

    let store: Arc<dyn TelemetryStore> = Arc::new(store);
    let collector = Arc::new(Collector::new(fetcher, store, notifier));

    let poll_collector = collector.clone();
    let poll_interval = settings.poll_interval;
    let poll_handle = tokio::spawn(async move {
        poll::run_poll_loop(poll_collector, poll_interval).await;
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(collector));

    let listener = tokio::net::TcpListener::bind(&settings.http_addr).await?;
    info!("HTTP server listening on {}", settings.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = poll_handle => {
            error!("Poll loop terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
