//metrics.rs
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_histogram, register_int_gauge, Counter, Histogram, HistogramOpts,
    IntGauge, Opts,
};

lazy_static! {
    // Live channel metrics
    pub static ref LIVE_EVENTS_RECEIVED: Counter = register_counter!(Opts::new(
        "live_events_received_total",
        "Total number of live notifications decoded and published"
    ))
    .unwrap();

    pub static ref MALFORMED_PAYLOADS: Counter = register_counter!(Opts::new(
        "malformed_payloads_total",
        "Total number of live payloads dropped because they failed to decode"
    ))
    .unwrap();

    pub static ref RECONNECT_ATTEMPTS: Counter = register_counter!(Opts::new(
        "live_reconnect_attempts_total",
        "Total number of live channel reconnection attempts"
    ))
    .unwrap();

    pub static ref LIVE_FEED_SIZE: IntGauge = register_int_gauge!(Opts::new(
        "live_feed_size",
        "Number of notifications currently held in the live feed"
    ))
    .unwrap();

    // REST metrics
    pub static ref HISTORY_FETCH_FAILURES: Counter = register_counter!(Opts::new(
        "history_fetch_failures_total",
        "Total number of failed notification history requests"
    ))
    .unwrap();

    pub static ref HISTORY_FETCH_TIME: Histogram = register_histogram!(
        HistogramOpts::new(
            "history_fetch_time_seconds",
            "Time taken to fetch the notification history"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
}

/// Render every registered metric in the prometheus text format.
pub fn metrics_snapshot() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("Error encoding metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(metrics) => metrics,
        Err(e) => format!("Error converting metrics to string: {}", e),
    }
}
