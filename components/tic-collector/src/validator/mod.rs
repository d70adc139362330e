/// `FrameValidator`, `Sample` and index monitoring.
pub mod validator;
