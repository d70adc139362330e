/// TOML configuration.
pub mod load_config;
/// Process shutdown token and signal listener.
pub mod shutdown;
