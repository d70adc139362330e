/// `/metrics` HTTP server.
pub mod http;
/// Metric registry.
pub mod metrics;
