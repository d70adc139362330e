/// clap command definitions and dispatch.
pub mod cli;
