/// Startup wiring for `tic-collector run`.
pub mod runtime;
/// Acquire, validate, persist, sleep.
pub mod sampling_loop;
