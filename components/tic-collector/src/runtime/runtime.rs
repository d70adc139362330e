// Local crates
use crate::{
    durable_log::durable_log::CsvLog,
    frame::reader::FrameReader,
    helpers::{load_config::Config, shutdown::Shutdown},
    metrics::http::start_metrics_server,
    runtime::sampling_loop::SamplingLoop,
    shipper::{influx::InfluxWriter, shipper::Shipper},
    transport::{async_read::StopOnExt, line_reader::LineReader, serial::open_serial},
    validator::validator::FrameValidator,
};

// External crates
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::instrument;

/// Collector runtime initialization and setup.
///
/// Startup failures (unreadable config, missing serial device, unwritable
/// durable log, bad remote endpoint) are returned before the first cycle.
#[instrument(name = "tic_runtime::run_collector", target = "runtime::runtime", skip_all)]
pub async fn run_collector(config_path: PathBuf) -> Result<()> {
    let cfg = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;
    tracing::info!(config = %config_path.display(), "Configuration loaded");

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    if cfg.metrics.enabled {
        let addr = cfg.metrics.listen_addr.clone();
        let cancel = shutdown.token();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&addr, cancel).await {
                tracing::error!(error = %e, "Metrics server stopped");
            }
        });
    }

    let serial = open_serial(&cfg.serial).context("serial transport unavailable")?;

    let durable = CsvLog::open(&cfg.durable.path)
        .await
        .context("durable log unavailable")?;

    let shipper = if cfg.remote.enabled {
        let writer = InfluxWriter::new(&cfg.remote).context("invalid remote store settings")?;
        tracing::info!(endpoint = %writer.endpoint(), "Remote store configured");
        Some(Shipper::from_config(writer, &cfg.remote))
    } else {
        tracing::warn!("Remote store disabled, samples are only written to the durable log");
        None
    };

    let loop_cancel = shutdown.token();
    // Shutdown ends a read blocked on the serial port as end of stream.
    let transport = Box::pin(serial.stop_on(loop_cancel.clone().cancelled_owned()));
    let reader = FrameReader::new(
        LineReader::new(transport, cfg.serial.read_timeout())
            .with_max_line_bytes(cfg.frame.max_line_bytes),
        cfg.frame.max_lines,
    );

    let sampling_loop = SamplingLoop::new(
        reader,
        FrameValidator::from_config(&cfg.frame),
        durable,
        shipper,
        cfg.sampling.interval(),
        loop_cancel,
    )
    .with_failure_policy(cfg.durable.failure_policy);

    let result = sampling_loop.run().await;

    // Stops the metrics server when the loop ended on its own.
    shutdown.trigger();

    result.context("sampling loop aborted")?;
    tracing::info!("Collector successfully shutdown");
    Ok(())
}
