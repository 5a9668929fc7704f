// Metrics and observability module
// This file handles collection and reporting of routing statistics,
// degraded data points and upstream call latency for the aggregator
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

pub static REQ_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aggr_request_latency_seconds",
        "latency for upstream calls",
        &["service", "method"]
    )
    .unwrap()
});

pub static REQ_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_request_errors_total",
        "errors by upstream",
        &["service", "method"]
    )
    .unwrap()
});

/// A token's native-asset conversion rate came back zero.
pub static NO_CONVERSION_TO_NATIVE: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_no_conversion_to_native_total",
        "tokens without a native-asset conversion rate",
        &["token_role"]
    )
    .unwrap()
});

pub static SAMPLER_OP_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_sampler_op_failures_total",
        "sampler ops that reverted or returned malformed data",
        &["op"]
    )
    .unwrap()
});

pub static ROUTER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aggr_router_duration_seconds",
        "time spent in the path optimizer",
        &["router", "phase"]
    )
    .unwrap()
});

pub static RFQ_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "aggr_rfq_request_duration_seconds",
        "private quote round trip",
        &["quote_type"]
    )
    .unwrap()
});

pub static NO_OPTIMAL_PATH: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aggr_no_optimal_path_total",
        "routing phases that produced no path",
        &["phase"]
    )
    .unwrap()
});

/// Render the default registry in the prometheus text format.
pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
