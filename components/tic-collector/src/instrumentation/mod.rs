/// Subscriber and panic hook setup.
pub mod tracing;
