// Local crates
use crate::durable_log::durable_log::{DurableLogError, DurableSink};
use crate::frame::reader::{FrameReader, ReadStop};
use crate::helpers::load_config::DurableFailurePolicy;
use crate::metrics::metrics::{
    CYCLE_DURATION_SECONDS, LAST_INDEX_WH, LAST_POWER_VA, SAMPLES_TOTAL,
    SHUTDOWN_INVOCATIONS_TOTAL, observe_duration,
};
use crate::shipper::shipper::{PointWriter, Shipper};
use crate::validator::validator::{FrameValidator, IndexMonitor, InvalidFrame, Sample};

// External crates
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The frame failed validation; nothing was written.
    Skipped { reason: InvalidFrame, stop: ReadStop },
    /// A sample was dispatched. `remote` is `None` when no remote store is
    /// configured.
    Persisted {
        sample: Sample,
        durable: bool,
        remote: Option<bool>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("durable log write failed, stopping collector: {0}")]
    Durable(#[from] DurableLogError),
}

/// Owns every long lived resource of the collector and drives
/// Acquire -> Validate -> Persist -> Sleep until shutdown.
///
/// Only the read and the sleep observe cancellation. Persist always runs to
/// completion, so a cycle is never left with a remote write lacking its
/// durable record.
#[derive(Debug)]
pub struct SamplingLoop<R, D, W> {
    reader: FrameReader<R>,
    validator: FrameValidator,
    monitor: IndexMonitor,
    durable: D,
    shipper: Option<Shipper<W>>,
    interval: Duration,
    failure_policy: DurableFailurePolicy,
    cancel: CancellationToken,
}

impl<R, D, W> SamplingLoop<R, D, W>
where
    R: AsyncRead + Unpin,
    D: DurableSink,
    W: PointWriter,
{
    pub fn new(
        reader: FrameReader<R>,
        validator: FrameValidator,
        durable: D,
        shipper: Option<Shipper<W>>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            validator,
            monitor: IndexMonitor::new(),
            durable,
            shipper,
            interval,
            failure_policy: DurableFailurePolicy::default(),
            cancel,
        }
    }

    pub fn with_failure_policy(mut self, policy: DurableFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// One Acquire -> Validate -> Persist pass, without the trailing sleep.
    #[instrument(
        name = "tic_sampling_loop::cycle",
        target = "runtime::sampling_loop",
        skip_all,
        level = "debug"
    )]
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, LoopError> {
        let start = Instant::now();
        let read = self.reader.read_frame().await;

        let sample = match self.validator.validate(&read.frame) {
            Ok(sample) => sample,
            Err(reason) => {
                tracing::debug!(
                    reason = %reason,
                    stop = ?read.stop,
                    "Skipping cycle, frame incomplete"
                );
                observe_duration(&CYCLE_DURATION_SECONDS, start);
                return Ok(CycleOutcome::Skipped {
                    reason,
                    stop: read.stop,
                });
            }
        };

        SAMPLES_TOTAL.inc();
        LAST_INDEX_WH.set(sample.index_wh() as f64);
        LAST_POWER_VA.set(sample.power_va() as f64);
        self.monitor.observe(&sample);

        let durable = match self.durable.append(&sample).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    timestamp = %sample.timestamp(),
                    index_wh = sample.index_wh(),
                    power_va = sample.power_va(),
                    policy = ?self.failure_policy,
                    "Durable log write failed"
                );
                match self.failure_policy {
                    DurableFailurePolicy::Fatal => {
                        observe_duration(&CYCLE_DURATION_SECONDS, start);
                        return Err(LoopError::Durable(e));
                    }
                    DurableFailurePolicy::Degrade => false,
                }
            }
        };

        let remote = match self.shipper.as_mut() {
            Some(shipper) => Some(shipper.send(&sample).await),
            None => None,
        };

        observe_duration(&CYCLE_DURATION_SECONDS, start);
        Ok(CycleOutcome::Persisted {
            sample,
            durable,
            remote,
        })
    }

    /// Run cycles until shutdown or a fatal durable log failure, then
    /// release every resource exactly once.
    #[instrument(
        name = "tic_sampling_loop::run",
        target = "runtime::sampling_loop",
        skip_all,
        level = "debug"
    )]
    pub async fn run(mut self) -> Result<(), LoopError> {
        tracing::info!(
            interval = ?self.interval,
            max_lines = self.reader.max_lines(),
            remote_enabled = self.shipper.is_some(),
            "Sampling loop started"
        );

        let result = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }

            if let Err(e) = self.run_cycle().await {
                break Err(e);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        };

        self.shutdown().await;
        result
    }

    async fn shutdown(self) {
        SHUTDOWN_INVOCATIONS_TOTAL.inc();
        tracing::info!("Closing collector resources");

        let Self {
            reader,
            mut durable,
            shipper,
            ..
        } = self;

        if let Err(e) = durable.close().await {
            tracing::error!(error = %e, "Failed to close durable log cleanly");
        }
        if let Some(mut shipper) = shipper {
            shipper.close().await;
        }
        drop(reader.into_inner());

        tracing::info!("Shutdown complete");
    }
}
