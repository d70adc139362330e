/// `RawLine` and `Frame` types.
pub mod frame;
/// Bounded frame reads from a line transport.
pub mod reader;
