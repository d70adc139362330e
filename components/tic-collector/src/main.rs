//! `tic-collector` binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Main entrypoint simply delegates control to the CLI layer.
    tic_collector::cli::cli::run().await
}
