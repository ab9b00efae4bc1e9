//! Metrics and observability utilities
//!
//! Prometheus metrics for the answer pipeline. Histogram buckets are sized for
//! LLM round-trips, which run from hundreds of milliseconds to minutes.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all HM-RAG metrics
pub const METRICS_PREFIX: &str = "hmrag";

/// Histogram buckets for end-to-end request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms - health checks
    0.050,  // 50ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s - direct answers on a warm model
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s - typical retrieval-augmented answer
    40.00,  // 40s
    60.00,  // 60s
    120.0,  // 2m
    180.0,  // 3m - request timeout
];

/// Buckets for individual backend calls
pub const BACKEND_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Routing metrics
    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Answers produced, by path"
    );

    // Retrieval pipeline metrics
    describe_histogram!(
        format!("{}_pipeline_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval-augmented pipeline latency in seconds"
    );

    describe_histogram!(
        format!("{}_sub_queries", METRICS_PREFIX),
        Unit::Count,
        "Sub-queries produced per decomposition"
    );

    describe_counter!(
        format!("{}_sub_query_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Sub-queries skipped after a retrieval or reranking error"
    );

    describe_gauge!(
        format!("{}_evidence_passages", METRICS_PREFIX),
        Unit::Count,
        "Passages in the last merged evidence set"
    );

    // Backend metrics
    describe_counter!(
        format!("{}_backend_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Calls to external model and index backends"
    );

    describe_histogram!(
        format!("{}_backend_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "External backend call latency in seconds"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks embedded and written to the index"
    );

    describe_counter!(
        format!("{}_ingestion_batch_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Ingestion batches that failed to embed or upsert"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Count an answer by the path that produced it
pub fn record_answer(path: &'static str) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "path" => path
    )
    .increment(1);
}

/// Record one run of the retrieval-augmented pipeline
pub fn record_pipeline(duration_secs: f64, sub_queries: usize, evidence: usize) {
    histogram!(format!("{}_pipeline_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_sub_queries", METRICS_PREFIX)).record(sub_queries as f64);
    gauge!(format!("{}_evidence_passages", METRICS_PREFIX)).set(evidence as f64);
}

/// Count a skipped sub-query by the stage that failed
pub fn record_sub_query_failure(stage: &'static str) {
    counter!(
        format!("{}_sub_query_failures_total", METRICS_PREFIX),
        "stage" => stage
    )
    .increment(1);
}

/// Record one external backend call
pub fn record_backend_call(backend: &'static str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_backend_calls_total", METRICS_PREFIX),
        "backend" => backend,
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_backend_duration_seconds", METRICS_PREFIX),
        "backend" => backend
    )
    .record(duration_secs);
}

/// Record the outcome of an ingestion run
pub fn record_ingestion(chunks_indexed: usize, failed_batches: usize) {
    counter!(format!("{}_chunks_indexed_total", METRICS_PREFIX)).increment(chunks_indexed as u64);
    counter!(format!("{}_ingestion_batch_failures_total", METRICS_PREFIX))
        .increment(failed_batches as u64);
}
