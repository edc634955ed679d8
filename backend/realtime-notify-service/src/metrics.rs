use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, TextEncoder,
};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_http_requests_total",
            "HTTP requests handled, WebSocket upgrades included",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create realtime_notify_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "realtime_notify_http_request_duration_seconds",
            "Time to produce a response; for upgrades, time to the 101",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["method", "path"],
    )
    .expect("failed to create realtime_notify_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register realtime_notify_http_request_duration_seconds");
    histogram
});

static ACTIVE_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "realtime_notify_active_connections",
            "Live WebSocket connections held by this process",
        ),
        &["registry"],
    )
    .expect("failed to create realtime_notify_active_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_notify_active_connections");
    gauge
});

static SEND_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_send_failures_total",
            "Frames that could not be written to a client, releasing the connection",
        ),
        &["registry"],
    )
    .expect("failed to create realtime_notify_send_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_send_failures_total");
    counter
});

static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_events_published_total",
            "Publish attempts by channel and outcome",
        ),
        &["channel", "outcome"],
    )
    .expect("failed to create realtime_notify_events_published_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_events_published_total");
    counter
});

static EVENTS_DISPATCHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_events_dispatched_total",
            "Broker messages routed to local connections",
        ),
        &["channel"],
    )
    .expect("failed to create realtime_notify_events_dispatched_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_events_dispatched_total");
    counter
});

static MALFORMED_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_malformed_messages_total",
            "Broker messages skipped because they could not be decoded",
        ),
        &["channel"],
    )
    .expect("failed to create realtime_notify_malformed_messages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_malformed_messages_total");
    counter
});

static SUBSCRIBER_RECONNECTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_notify_subscriber_reconnects_total",
            "Times a subscriber loop lost its subscription and backed off",
        ),
        &["channel"],
    )
    .expect("failed to create realtime_notify_subscriber_reconnects_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_notify_subscriber_reconnects_total");
    counter
});

/// `path` is the matched route pattern, never the raw URI.
pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(elapsed.as_secs_f64());
}

pub fn set_active_connections(registry: &str, count: usize) {
    ACTIVE_CONNECTIONS
        .with_label_values(&[registry])
        .set(count as i64);
}

pub fn record_send_failure(registry: &str) {
    SEND_FAILURES_TOTAL.with_label_values(&[registry]).inc();
}

/// `outcome` is one of "published", "dropped", "delivered_locally".
pub fn record_publish(channel: &str, outcome: &str) {
    EVENTS_PUBLISHED_TOTAL
        .with_label_values(&[channel, outcome])
        .inc();
}

pub fn record_dispatched(channel: &str) {
    EVENTS_DISPATCHED_TOTAL.with_label_values(&[channel]).inc();
}

pub fn record_malformed(channel: &str) {
    MALFORMED_MESSAGES_TOTAL.with_label_values(&[channel]).inc();
}

pub fn record_subscriber_reconnect(channel: &str) {
    SUBSCRIBER_RECONNECTS_TOTAL
        .with_label_values(&[channel])
        .inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
