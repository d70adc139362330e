//! Shipper - best-effort delivery to the remote time-series store
//!
//! The Shipper turns a validated [`Sample`] into a [`Point`] and hands it to
//! a [`PointWriter`]. It never retries and never lets an error escape:
//! every failure is logged with the sample's timestamp and values and
//! becomes `false`. Delivery is at-most-once; the durable log is the
//! record to replay from if a gap in the remote store matters.

// Local crates
use crate::helpers::load_config::RemoteConfig;
use crate::metrics::metrics::{
    REMOTE_FAILURES_TOTAL, REMOTE_WRITE_DURATION_SECONDS, REMOTE_WRITES_TOTAL, observe_duration,
};
use crate::shipper::point::Point;
use crate::validator::validator::Sample;

// External crates
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::instrument;

pub const INDEX_FIELD: &str = "index";
pub const POWER_FIELD: &str = "power";
pub const DEVICE_TAG: &str = "device";

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("invalid remote endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("server rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("remote client already closed")]
    Closed,
}

/// Client for the remote store. Addressing and credentials belong to the
/// implementation; the shipper only sees points.
#[async_trait]
pub trait PointWriter: Send {
    async fn write(&mut self, point: &Point) -> Result<(), WriteError>;

    /// Release connections. Called once on shutdown.
    async fn close(&mut self);
}

#[derive(Debug)]
pub struct Shipper<W> {
    writer: W,
    measurement: String,
    device: String,
}

impl<W> Shipper<W>
where
    W: PointWriter,
{
    pub fn new(writer: W, measurement: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            writer,
            measurement: measurement.into(),
            device: device.into(),
        }
    }

    pub fn from_config(writer: W, config: &RemoteConfig) -> Self {
        Self::new(writer, config.measurement.clone(), config.device_tag.clone())
    }

    pub fn point_for(&self, sample: &Sample) -> Point {
        Point::new(self.measurement.clone())
            .tag(DEVICE_TAG, self.device.clone())
            .field(INDEX_FIELD, sample.index_wh())
            .field(POWER_FIELD, sample.power_va())
            .timestamp(sample.timestamp())
    }

    /// Write one sample. Returns whether the store accepted it.
    #[instrument(
        name = "tic_shipper::send",
        target = "shipper::shipper::Shipper",
        skip_all,
        level = "debug"
    )]
    pub async fn send(&mut self, sample: &Sample) -> bool {
        let point = self.point_for(sample);
        let start = Instant::now();
        let result = self.writer.write(&point).await;
        observe_duration(&REMOTE_WRITE_DURATION_SECONDS, start);

        match result {
            Ok(()) => {
                REMOTE_WRITES_TOTAL.inc();
                tracing::info!(
                    timestamp = %sample.timestamp(),
                    power_va = sample.power_va(),
                    "Sample sent to remote store"
                );
                true
            }
            Err(e) => {
                REMOTE_FAILURES_TOTAL.inc();
                tracing::warn!(
                    error = %e,
                    timestamp = %sample.timestamp(),
                    index_wh = sample.index_wh(),
                    power_va = sample.power_va(),
                    "Remote store write failed, sample kept in durable log only"
                );
                false
            }
        }
    }

    pub async fn close(&mut self) {
        self.writer.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::validator::sample_for_tests;
    use chrono::{TimeZone, Utc};
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[derive(Debug, Default)]
    struct ScriptedWriter {
        fail: bool,
        written: Vec<Point>,
        closed: usize,
    }

    #[async_trait]
    impl PointWriter for ScriptedWriter {
        async fn write(&mut self, point: &Point) -> Result<(), WriteError> {
            if self.fail {
                return Err(WriteError::Request("connection refused".into()));
            }
            self.written.push(point.clone());
            Ok(())
        }

        async fn close(&mut self) {
            self.closed += 1;
        }
    }

    #[tokio::test]
    async fn builds_point_from_sample() {
        let mut shipper = Shipper::new(ScriptedWriter::default(), "consommation", "linky");
        let at = Utc::now();

        assert!(shipper.send(&sample_for_tests(at, 1234, 450)).await);

        let point = &shipper.writer.written[0];
        assert_eq!(point.measurement(), "consommation");
        assert_eq!(point.tag_value(DEVICE_TAG), Some("linky"));
        assert_eq!(point.field_value(INDEX_FIELD), Some(1234));
        assert_eq!(point.field_value(POWER_FIELD), Some(450));
        assert!(point.to_line_protocol().ends_with(&at.timestamp().to_string()));
    }

    #[tokio::test]
    async fn writer_error_becomes_false() {
        let writer = ScriptedWriter {
            fail: true,
            ..ScriptedWriter::default()
        };
        let mut shipper = Shipper::new(writer, "consommation", "linky");

        assert!(!shipper.send(&sample_for_tests(Utc::now(), 1, 1)).await);
        assert!(!shipper.send(&sample_for_tests(Utc::now(), 2, 1)).await);
        assert!(shipper.writer.written.is_empty());
    }

    #[tokio::test]
    async fn close_reaches_the_writer() {
        let mut shipper = Shipper::new(ScriptedWriter::default(), "consommation", "linky");
        shipper.close().await;
        assert_eq!(shipper.writer.closed, 1);
    }

    #[tokio::test]
    async fn failed_write_is_logged_with_sample_timestamp() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        // Current-thread test runtime, so the thread local default covers the send.
        let _guard = tracing::subscriber::set_default(subscriber);

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut shipper = Shipper::new(
            ScriptedWriter {
                fail: true,
                ..ScriptedWriter::default()
            },
            "consommation",
            "linky",
        );
        assert!(!shipper.send(&sample_for_tests(at, 1234, 450)).await);

        let text = logs.text();
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("Remote store write failed"), "{text}");
        assert!(text.contains(&format!("timestamp={at}")), "{text}");
        assert!(text.contains("index_wh=1234"), "{text}");
        assert!(text.contains("power_va=450"), "{text}");
        assert!(text.contains("connection refused"), "{text}");
    }
}
