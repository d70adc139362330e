// External crates
use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram,
};
use std::time::Instant;

/// Helper to observe histogram duration
pub fn observe_duration(hist: &Histogram, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    hist.observe(elapsed);
}

lazy_static! {
    // ======== Acquisition Metrics ========
    pub static ref LINES_READ_TOTAL: Counter = register_counter!(
        "tic_collector_lines_read_total",
        "Total number of lines read from the serial transport"
    ).unwrap();

    pub static ref LINES_DISCARDED_TOTAL: Counter = register_counter!(
        "tic_collector_lines_discarded_total",
        "Lines skipped because they did not carry a label and a value"
    ).unwrap();

    pub static ref READ_TIMEOUTS_TOTAL: Counter = register_counter!(
        "tic_collector_read_timeouts_total",
        "Frame reads cut short by the per-line read timeout"
    ).unwrap();

    pub static ref TRANSPORT_ERRORS_TOTAL: Counter = register_counter!(
        "tic_collector_transport_errors_total",
        "I/O errors returned by the serial transport while reading a frame"
    ).unwrap();

    // ======== Validation Metrics ========
    pub static ref FRAMES_READ_TOTAL: Counter = register_counter!(
        "tic_collector_frames_read_total",
        "Frames assembled by the frame reader"
    ).unwrap();

    pub static ref FRAMES_INVALID_TOTAL: Counter = register_counter!(
        "tic_collector_frames_invalid_total",
        "Frames rejected by the validator"
    ).unwrap();

    pub static ref SAMPLES_TOTAL: Counter = register_counter!(
        "tic_collector_samples_total",
        "Validated samples dispatched to the sinks"
    ).unwrap();

    pub static ref INDEX_REGRESSIONS_TOTAL: Counter = register_counter!(
        "tic_collector_index_regressions_total",
        "Samples whose energy index was lower than the previous one"
    ).unwrap();

    pub static ref LAST_INDEX_WH: Gauge = register_gauge!(
        "tic_collector_last_index_wh",
        "Energy index of the last accepted sample (Wh)"
    ).unwrap();

    pub static ref LAST_POWER_VA: Gauge = register_gauge!(
        "tic_collector_last_power_va",
        "Apparent power of the last accepted sample (VA)"
    ).unwrap();

    // ======== Sink Metrics ========
    pub static ref DURABLE_WRITES_TOTAL: Counter = register_counter!(
        "tic_collector_durable_writes_total",
        "Records appended to the local durable log"
    ).unwrap();

    pub static ref DURABLE_FAILURES_TOTAL: Counter = register_counter!(
        "tic_collector_durable_failures_total",
        "Failed appends to the local durable log"
    ).unwrap();

    pub static ref REMOTE_WRITES_TOTAL: Counter = register_counter!(
        "tic_collector_remote_writes_total",
        "Points accepted by the remote time-series store"
    ).unwrap();

    pub static ref REMOTE_FAILURES_TOTAL: Counter = register_counter!(
        "tic_collector_remote_failures_total",
        "Points the remote time-series store did not accept"
    ).unwrap();

    pub static ref REMOTE_WRITE_DURATION_SECONDS: Histogram = register_histogram!(
        "tic_collector_remote_write_duration_seconds",
        "Histogram of remote write durations (seconds)",
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // ======== Lifecycle Metrics ========
    pub static ref CYCLE_DURATION_SECONDS: Histogram = register_histogram!(
        "tic_collector_cycle_duration_seconds",
        "Histogram of sampling cycle durations excluding the sleep (seconds)",
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref SHUTDOWN_INVOCATIONS_TOTAL: Counter = register_counter!(
        "tic_collector_shutdown_invocations_total",
        "Number of graceful shutdown invocations"
    ).unwrap();
}
