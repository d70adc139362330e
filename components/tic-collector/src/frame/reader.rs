// Local crates
use crate::frame::frame::{Frame, RawLine};
use crate::metrics::metrics::{
    FRAMES_READ_TOTAL, LINES_DISCARDED_TOTAL, LINES_READ_TOTAL, READ_TIMEOUTS_TOTAL,
    TRANSPORT_ERRORS_TOTAL,
};
use crate::transport::{TransportError, line_reader::LineReader};

// External crates
use tokio::io::AsyncRead;
use tracing::instrument;

/// Why a frame read stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStop {
    /// `max_lines` lines were consumed.
    LineBudget,
    /// The transport stayed silent for longer than the read timeout.
    Timeout,
    /// The transport reported end of stream (or shutdown was requested).
    EndOfStream,
    /// The transport returned an I/O error.
    Failed,
}

/// Result of one acquisition: the frame and the reason reading stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRead {
    pub frame: Frame,
    pub lines: usize,
    pub stop: ReadStop,
}

/// Assembles frames from a line oriented transport.
///
/// Historic TIC frames are delimited by STX/ETX, but those markers are not
/// relied on here. A frame is whatever label/value lines arrive within
/// `max_lines` reads. This is a known approximation: a read can start in the
/// middle of a meter frame and mix two of them, which is harmless for the
/// two counters extracted downstream, and in exchange a corrupted stream
/// that never produces a frame boundary still costs at most `max_lines`
/// reads per cycle.
#[derive(Debug)]
pub struct FrameReader<R> {
    lines: LineReader<R>,
    max_lines: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(lines: LineReader<R>, max_lines: usize) -> Self {
        Self { lines, max_lines }
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Read up to `max_lines` lines and merge them into a fresh frame.
    ///
    /// Never fails: malformed lines are skipped, and a timeout, end of
    /// stream or transport error ends the read early with whatever was
    /// collected. Completeness is checked by the validator.
    #[instrument(
        name = "tic_frame_reader::read_frame",
        target = "frame::reader",
        skip_all,
        level = "debug"
    )]
    pub async fn read_frame(&mut self) -> FrameRead {
        let mut frame = Frame::new();
        let mut lines = 0;

        let stop = loop {
            if lines >= self.max_lines {
                break ReadStop::LineBudget;
            }

            match self.lines.read_line().await {
                Ok(Some(bytes)) => {
                    lines += 1;
                    LINES_READ_TOTAL.inc();

                    let line = RawLine::decode(&bytes);
                    if !frame.merge_line(&line) {
                        LINES_DISCARDED_TOTAL.inc();
                        tracing::trace!(raw_line = %line, "Discarding line without label and value");
                    }
                }
                Err(TransportError::LineTooLong(limit)) => {
                    lines += 1;
                    LINES_READ_TOTAL.inc();
                    LINES_DISCARDED_TOTAL.inc();
                    tracing::debug!(limit, "Discarding oversized line");
                }
                Ok(None) => break ReadStop::EndOfStream,
                Err(TransportError::Timeout(after)) => {
                    READ_TIMEOUTS_TOTAL.inc();
                    tracing::debug!(
                        timeout = ?after,
                        lines_read = lines,
                        "Serial transport silent, handing partial frame to validation"
                    );
                    break ReadStop::Timeout;
                }
                Err(e) => {
                    TRANSPORT_ERRORS_TOTAL.inc();
                    tracing::warn!(
                        error = %e,
                        lines_read = lines,
                        "Serial transport read failed, handing partial frame to validation"
                    );
                    break ReadStop::Failed;
                }
            }
        };

        FRAMES_READ_TOTAL.inc();
        if frame.is_empty() {
            tracing::debug!(lines_read = lines, stop = ?stop, "No label/value line in this read");
        } else {
            tracing::debug!(
                lines_read = lines,
                labels = ?frame.labels().collect::<Vec<_>>(),
                stop = ?stop,
                "Frame read finished"
            );
        }

        FrameRead { frame, lines, stop }
    }

    pub fn into_inner(self) -> R {
        self.lines.into_inner()
    }
}
