//! Durable Log - the collector's ground truth
//!
//! Every validated sample is appended to a local CSV file before the remote
//! store is even attempted. The file is opened once, kept open for the life
//! of the process and closed exactly once on shutdown.
//!
//! Format (one record per line, locale independent):
//!
//! ```text
//! Date,Index_Wh,Power_VA
//! 2024-03-01 12:00:00,1234,450
//! ```
//!
//! The header is written only when the file is empty at open time, so
//! restarting the collector keeps appending to the same log.

// Local crates
use crate::metrics::metrics::{DURABLE_FAILURES_TOTAL, DURABLE_WRITES_TOTAL};
use crate::validator::validator::Sample;

// External crates
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

pub const CSV_HEADER: &str = "Date,Index_Wh,Power_VA";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum DurableLogError {
    #[error("failed to open durable log {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write durable log {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("durable log {0:?} is already closed")]
    Closed(PathBuf),
}

/// Local append-only persistence for samples.
#[async_trait]
pub trait DurableSink: Send {
    /// Append exactly one record and make it reach the disk.
    async fn append(&mut self, sample: &Sample) -> Result<(), DurableLogError>;

    /// Flush and release the backing store. Later appends fail.
    async fn close(&mut self) -> Result<(), DurableLogError>;
}

/// CSV implementation of [`DurableSink`].
#[derive(Debug)]
pub struct CsvLog {
    path: PathBuf,
    file: Option<File>,
}

impl CsvLog {
    /// Open `path` for append, creating it if needed, and write the header
    /// when the file is empty.
    #[instrument(
        name = "tic_durable_log::open",
        target = "durable_log::durable_log",
        skip_all,
        fields(path = %path.as_ref().display()),
        level = "debug"
    )]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DurableLogError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| DurableLogError::Open {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_err)?;

        let existing_len = file.metadata().await.map_err(open_err)?.len();
        if existing_len == 0 {
            tracing::info!(path = %path.display(), "Durable log is empty, writing CSV header");
            file.write_all(format!("{CSV_HEADER}\n").as_bytes())
                .await
                .map_err(open_err)?;
            file.flush().await.map_err(open_err)?;
        } else {
            tracing::info!(
                path = %path.display(),
                existing_bytes = existing_len,
                "Appending to existing durable log"
            );
        }

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    fn format_record(sample: &Sample) -> String {
        format!(
            "{},{},{}\n",
            sample.timestamp().with_timezone(&Local).format(TIMESTAMP_FORMAT),
            sample.index_wh(),
            sample.power_va()
        )
    }

    fn write_err(&self, source: std::io::Error) -> DurableLogError {
        DurableLogError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl DurableSink for CsvLog {
    #[instrument(
        name = "tic_durable_log::append",
        target = "durable_log::durable_log",
        skip_all,
        level = "debug"
    )]
    async fn append(&mut self, sample: &Sample) -> Result<(), DurableLogError> {
        let record = Self::format_record(sample);

        let result = match self.file.as_mut() {
            None => Err(DurableLogError::Closed(self.path.clone())),
            Some(file) => {
                let written = async {
                    file.write_all(record.as_bytes()).await?;
                    file.flush().await?;
                    file.sync_data().await
                }
                .await;
                written.map_err(|e| self.write_err(e))
            }
        };

        match &result {
            Ok(()) => {
                DURABLE_WRITES_TOTAL.inc();
                tracing::debug!(
                    timestamp = %sample.timestamp(),
                    index_wh = sample.index_wh(),
                    power_va = sample.power_va(),
                    "Sample appended to durable log"
                );
            }
            Err(_) => DURABLE_FAILURES_TOTAL.inc(),
        }
        result
    }

    async fn close(&mut self) -> Result<(), DurableLogError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush().await.map_err(|e| self.write_err(e))?;
        file.sync_all().await.map_err(|e| self.write_err(e))?;
        tracing::info!(path = %self.path.display(), "Durable log closed");
        Ok(())
    }
}
