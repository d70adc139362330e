// Local crates
use crate::transport::TransportError;

// External crates
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::timeout;

/// Historic TIC lines are under 40 bytes; anything far longer is noise or a
/// wrong line speed.
pub const DEFAULT_MAX_LINE_BYTES: usize = 256;

/// Newline delimited reads over a byte transport, each bounded by a timeout
/// so a silent or unplugged meter cannot block the sampling loop forever.
///
/// A line longer than `max_line_bytes` is dropped with
/// [`TransportError::LineTooLong`] and the rest of it, up to the next
/// newline, is skipped. The buffered partial line therefore never exceeds
/// `max_line_bytes`, however long the stream goes without a newline.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: BufReader<R>,
    read_timeout: Duration,
    max_line_bytes: usize,
    // Bytes of a line that was still incomplete when a read timed out.
    pending: Vec<u8>,
    // Dropping bytes until the end of an oversized line.
    skipping: bool,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(transport: R, read_timeout: Duration) -> Self {
        Self {
            inner: BufReader::new(transport),
            read_timeout,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            pending: Vec::with_capacity(64),
            skipping: false,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    /// Read the next line, without its terminator.
    ///
    /// Returns `Ok(None)` at end of stream. A trailing line without a newline
    /// is still returned before `None`. On timeout the partial bytes are kept
    /// and completed by the next call.
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match timeout(self.read_timeout, self.next_line()).await {
            Err(_) => Err(TransportError::Timeout(self.read_timeout)),
            Ok(line) => line,
        }
    }

    // Only mutates `pending`/`skipping` between awaits, so dropping the
    // future on timeout loses no bytes.
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                self.skipping = false;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let content = &available[..newline.unwrap_or(available.len())];
            let consumed = newline.map_or(available.len(), |at| at + 1);

            if self.skipping {
                self.inner.consume(consumed);
                if newline.is_some() {
                    self.skipping = false;
                }
                continue;
            }

            if self.pending.len() + content.len() > self.max_line_bytes {
                // Nothing consumed: the next call skips from here.
                self.pending.clear();
                self.skipping = true;
                return Err(TransportError::LineTooLong(self.max_line_bytes));
            }

            self.pending.extend_from_slice(content);
            self.inner.consume(consumed);
            if newline.is_some() {
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn splits_on_newlines_and_keeps_unterminated_tail() {
        let mut reader = LineReader::new(b"BASE 1\r\nPAPP 2\nIINST".as_slice(), Duration::from_secs(1));

        assert_eq!(reader.read_line().await.unwrap(), Some(b"BASE 1\r".to_vec()));
        assert_eq!(reader.read_line().await.unwrap(), Some(b"PAPP 2".to_vec()));
        assert_eq!(reader.read_line().await.unwrap(), Some(b"IINST".to_vec()));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_transport_times_out_and_resumes_partial_line() {
        let (mut meter, collector) = tokio::io::duplex(64);
        let mut reader = LineReader::new(collector, Duration::from_millis(500));

        meter.write_all(b"PAPP 00").await.unwrap();
        assert!(matches!(
            reader.read_line().await,
            Err(TransportError::Timeout(_))
        ));

        meter.write_all(b"450\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), Some(b"PAPP 00450".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn newline_free_stream_keeps_buffer_bounded() {
        let (mut meter, collector) = tokio::io::duplex(4096);
        let mut reader = LineReader::new(collector, Duration::from_millis(500));
        let noise = [b'Z'; 120];

        let mut too_long = 0;
        for _ in 0..1000 {
            meter.write_all(&noise).await.unwrap();
            match reader.read_line().await {
                Err(TransportError::LineTooLong(limit)) => {
                    assert_eq!(limit, DEFAULT_MAX_LINE_BYTES);
                    too_long += 1;
                }
                Err(TransportError::Timeout(_)) => {}
                other => panic!("unexpected read result: {other:?}"),
            }
            assert!(reader.pending.len() <= DEFAULT_MAX_LINE_BYTES);
        }
        assert_eq!(too_long, 1);

        // The next newline ends the oversized line; reading resumes after it.
        meter.write_all(b"\nBASE 001234\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), Some(b"BASE 001234".to_vec()));
    }

    #[tokio::test]
    async fn line_at_the_limit_is_kept() {
        let input = b"PAPP 00450\nPAPP 004500\nIINST 2\n";
        let mut reader = LineReader::new(input.as_slice(), Duration::from_secs(1)).with_max_line_bytes(10);

        assert_eq!(reader.read_line().await.unwrap(), Some(b"PAPP 00450".to_vec()));
        assert!(matches!(
            reader.read_line().await,
            Err(TransportError::LineTooLong(10))
        ));
        assert_eq!(reader.read_line().await.unwrap(), Some(b"IINST 2".to_vec()));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }
}
