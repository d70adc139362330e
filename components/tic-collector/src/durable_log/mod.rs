/// `DurableSink` and its CSV implementation.
pub mod durable_log;
