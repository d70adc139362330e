//! Linky TIC telemetry collector.
//!
//! Frames are read from the meter's serial link, validated into samples and
//! written first to a local CSV log, then to InfluxDB.

/// Command line entry point.
pub mod cli;
/// Local append-only CSV log of samples.
pub mod durable_log;
/// Label/value frames read from the meter.
pub mod frame;
/// Configuration loading and shutdown handling.
pub mod helpers;
/// Logging setup.
pub mod instrumentation;
/// Prometheus metrics and their HTTP endpoint.
pub mod metrics;
/// Collector assembly and the sampling loop.
pub mod runtime;
/// Best-effort delivery of samples to InfluxDB.
pub mod shipper;
/// Serial byte transport and line reads.
pub mod transport;
/// Frame validation into typed samples.
pub mod validator;
