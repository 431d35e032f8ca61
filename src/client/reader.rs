//! The read handle returned by RETR.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::sync::Mutex;

use crate::client::ClientInner;
use crate::error::{FtpError, FtpResult};

/// Streams the bytes of a file being retrieved.
///
/// The handle owns the data connection and keeps a reference back to the
/// session, identified by the transfer it was minted for: closing it
/// closes the data socket and then reads the transfer's final reply on
/// the control channel, releasing the session for the next operation.
/// Closing twice is a no-op, as is closing after the session has moved
/// past this transfer.
///
/// Dropping the handle without closing it leaves the final reply in
/// flight; the session drains it before its next command.
pub struct FileReader {
    session: Arc<Mutex<ClientInner>>,
    id: u64,
    data: Option<crate::stream::BoxStream>,
    abandoned: Arc<AtomicBool>,
    closed: bool,
}

impl FileReader {
    pub(crate) fn new(
        session: Arc<Mutex<ClientInner>>,
        id: u64,
        data: crate::stream::BoxStream,
        abandoned: Arc<AtomicBool>,
    ) -> Self {
        FileReader {
            session,
            id,
            data: Some(data),
            abandoned,
            closed: false,
        }
    }

    /// Finishes the transfer: closes the data connection and reads the
    /// final 226/250 on the control channel.
    pub async fn close(&mut self) -> FtpResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut close_err: Option<FtpError> = None;
        if let Some(mut data) = self.data.take() {
            if let Err(e) = data.shutdown().await {
                close_err = Some(e.into());
            }
        }

        let mut inner = self.session.lock().await;
        let mut reply_err: Option<FtpError> = None;
        if !inner.is_closed() && inner.transfer_matches(self.id) {
            inner.clear_transfer();
            if let Err(e) = inner.finish_transfer().await {
                reply_err = Some(inner.seal_fatal(e));
            }
        }

        match FtpError::merge(reply_err, close_err) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

impl AsyncRead for FileReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.data.as_mut() {
            Some(data) => Pin::new(data).poll_read(cx, buf),
            // After close the stream just reports end of file.
            None => Poll::Ready(Ok(())),
        }
    }
}

impl Drop for FileReader {
    fn drop(&mut self) {
        if !self.closed {
            self.abandoned.store(true, Ordering::Release);
        }
    }
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("transfer", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}
