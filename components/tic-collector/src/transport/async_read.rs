use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf, Result as IoResult};

/// Turns a stop condition into end-of-stream on a reader.
///
/// The sampling loop wraps the serial port with the shutdown future so a
/// read blocked on a silent meter returns EOF as soon as shutdown is
/// requested. See [this code](https://github.com/vectordotdev/vector/blob/master/src/async_read.rs)
pub trait StopOnExt: AsyncRead {
    fn stop_on<F>(self, until: F) -> StopOn<Self, F>
    where
        Self: Sized,
        F: Future<Output = ()>,
    {
        StopOn {
            reader: self,
            until,
            stopped: false,
        }
    }
}

impl<S> StopOnExt for S where S: AsyncRead {}

#[pin_project]
#[derive(Debug)]
pub struct StopOn<S, F> {
    #[pin]
    reader: S,
    #[pin]
    until: F,
    // Set once `until` has completed; it is never polled again.
    stopped: bool,
}

impl<S, F> AsyncRead for StopOn<S, F>
where
    S: AsyncRead,
    F: Future<Output = ()>,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        let this = self.project();

        // The stop future is never polled again once it has completed.
        if *this.stopped {
            return Poll::Ready(Ok(()));
        }

        match this.until.poll(cx) {
            Poll::Ready(()) => {
                *this.stopped = true;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => this.reader.poll_read(cx, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn reads_pass_through_until_stopped() {
        let token = CancellationToken::new();
        let mut reader = Box::pin(b"BASE 001234\n".as_slice().stop_on(token.clone().cancelled_owned()));

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"BASE 001234\n");
    }

    #[tokio::test]
    async fn cancellation_ends_a_pending_read() {
        let token = CancellationToken::new();
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = Box::pin(server.stop_on(token.clone().cancelled_owned()));

        token.cancel();
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        // Reading again stays at EOF without touching the finished future.
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}
