use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_cycles_total",
        "Total poll cycles started"
    ))
    .unwrap();
    pub static ref FETCH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_fetch_failures_total",
        "Total fetches that failed after all retries"
    ))
    .unwrap();
    pub static ref SAVE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_save_failures_total",
        "Total batches that failed to persist"
    ))
    .unwrap();
    pub static ref READINGS_SAVED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_readings_saved_total",
        "Total readings written to the database"
    ))
    .unwrap();
    pub static ref READINGS_SKIPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_readings_skipped_total",
        "Total readings skipped as malformed or rejected by the database"
    ))
    .unwrap();
    pub static ref ALERTS_SENT_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_alerts_sent_total",
        "Total alert emails delivered"
    ))
    .unwrap();
    pub static ref ALERTS_SUPPRESSED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "poller_alerts_suppressed_total",
        "Total alerts suppressed because the category was already notified"
    ))
    .unwrap();
    pub static ref CYCLE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "poller_cycle_duration_seconds",
            "Time taken by one fetch-persist cycle"
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0, 300.0, 600.0])
    )
    .unwrap();
    pub static ref CYCLE_RUNNING: Gauge = Gauge::with_opts(Opts::new(
        "poller_cycle_running",
        "1 while a poll cycle is in progress, 0 while idle"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SAVE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_SAVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(READINGS_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERTS_SENT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ALERTS_SUPPRESSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CYCLE_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(CYCLE_RUNNING.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
