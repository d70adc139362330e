// Local crates
use crate::frame::frame::Frame;
use crate::helpers::load_config::FrameConfig;
use crate::metrics::metrics::{FRAMES_INVALID_TOTAL, INDEX_REGRESSIONS_TOTAL};

// External crates
use chrono::{DateTime, Utc};
use tracing::instrument;

/// Validated reading extracted from a frame.
///
/// Fields are private: a `Sample` only comes out of
/// [`FrameValidator::validate`], so neither sink ever sees a partial or
/// defaulted reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    timestamp: DateTime<Utc>,
    index_wh: u64,
    power_va: u64,
}

impl Sample {
    /// When the frame was accepted, not when the meter measured it.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Cumulative energy index (Wh).
    pub fn index_wh(&self) -> u64 {
        self.index_wh
    }

    /// Apparent power (VA).
    pub fn power_va(&self) -> u64 {
        self.power_va
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFrame {
    #[error("frame has no {0} label")]
    MissingLabel(String),
    #[error("{label} value {value:?} is not a base-10 unsigned integer")]
    NotAnInteger { label: String, value: String },
}

/// Checks a frame for the two counters the collector stores.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    index_label: String,
    power_label: String,
}

impl FrameValidator {
    pub fn new(index_label: impl Into<String>, power_label: impl Into<String>) -> Self {
        Self {
            index_label: index_label.into(),
            power_label: power_label.into(),
        }
    }

    pub fn from_config(config: &FrameConfig) -> Self {
        Self::new(config.index_label.clone(), config.power_label.clone())
    }

    /// Validate `frame`, stamping the sample with the current wall clock.
    #[instrument(
        name = "tic_validator::validate",
        target = "validator::validator",
        skip_all,
        level = "debug"
    )]
    pub fn validate(&self, frame: &Frame) -> Result<Sample, InvalidFrame> {
        self.validate_at(frame, Utc::now())
    }

    pub fn validate_at(&self, frame: &Frame, timestamp: DateTime<Utc>) -> Result<Sample, InvalidFrame> {
        let checked = self
            .field(frame, &self.index_label)
            .and_then(|index_wh| Ok((index_wh, self.field(frame, &self.power_label)?)));

        match checked {
            Ok((index_wh, power_va)) => Ok(Sample {
                timestamp,
                index_wh,
                power_va,
            }),
            Err(e) => {
                FRAMES_INVALID_TOTAL.inc();
                tracing::debug!(reason = %e, labels = frame.len(), "Frame rejected");
                Err(e)
            }
        }
    }

    fn field(&self, frame: &Frame, label: &str) -> Result<u64, InvalidFrame> {
        let value = frame
            .get(label)
            .ok_or_else(|| InvalidFrame::MissingLabel(label.to_string()))?;

        // `u64::from_str` accepts a leading '+', meter values never carry one.
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidFrame::NotAnInteger {
                label: label.to_string(),
                value: value.to_string(),
            });
        }

        value.parse::<u64>().map_err(|_| InvalidFrame::NotAnInteger {
            label: label.to_string(),
            value: value.to_string(),
        })
    }
}

/// What the index monitor concluded about a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTrend {
    First,
    Steady,
    /// The index went down: meter reset, rollover or replacement.
    Regressed { previous: u64 },
}

/// Tracks the energy index across cycles.
///
/// The index should never decrease on a healthy meter. A decrease is
/// flagged but the sample is still accepted; the raw value is what the
/// meter reported and downstream consumers decide what a reset means.
#[derive(Debug, Default)]
pub struct IndexMonitor {
    last: Option<u64>,
}

impl IndexMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sample: &Sample) -> IndexTrend {
        let trend = match self.last {
            None => IndexTrend::First,
            Some(previous) if sample.index_wh < previous => {
                INDEX_REGRESSIONS_TOTAL.inc();
                tracing::warn!(
                    previous_index_wh = previous,
                    index_wh = sample.index_wh,
                    timestamp = %sample.timestamp,
                    "Energy index decreased, meter may have been reset or replaced"
                );
                IndexTrend::Regressed { previous }
            }
            Some(_) => IndexTrend::Steady,
        };
        self.last = Some(sample.index_wh);
        trend
    }
}

#[cfg(test)]
pub(crate) fn sample_for_tests(timestamp: DateTime<Utc>, index_wh: u64, power_va: u64) -> Sample {
    Sample {
        timestamp,
        index_wh,
        power_va,
    }
}
