//! Byte-stream framing layer beneath the protocol adapters.
//!
//! A transport owns the read half of a client connection; the write half is
//! behind a [`SharedWriter`] so the event thread can emit messages while the
//! request thread is blocked reading. Every write is atomic at the
//! granularity of one message.

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::LineTransport;

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Largest message body accepted from a client.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("connection closed")]
    Closed,
    #[error("missing Content-Length header")]
    MissingLength,
    #[error("missing header delimiter")]
    MissingDelimiter,
    #[error("malformed Content-Length: {0:?}")]
    BadLength(String),
    #[error("message length {0} below minimum")]
    LengthTooSmall(usize),
    #[error("message length {0} above limit")]
    LengthTooLarge(usize),
    #[error("unsupported header: {0:?}")]
    UnknownHeader(String),
}

/// A transport frames bytes between one client and one adapter.
pub trait Transport: Send {
    /// Read bytes up to and including the next newline.
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Read exactly `n` bytes, failing on a short read.
    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError>;

    /// Write one message and flush.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Handle to the write half, shared with asynchronous event emission.
    fn writer(&self) -> SharedWriter;
}

/// Write half of a transport, shared between the request loop and the
/// event thread.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<Box<dyn Write + Send>>>);

impl SharedWriter {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        SharedWriter(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Write `bytes` as one unit and flush.
    pub fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let mut w = self.0.lock().unwrap();
        w.write_all(bytes)?;
        w.flush()
    }

    /// Run `f` with exclusive access to the writer, then flush. Used when a
    /// single message is assembled from several writes.
    pub fn with_locked<R>(
        &self,
        f: impl FnOnce(&mut dyn Write) -> io::Result<R>,
    ) -> io::Result<R> {
        let mut w = self.0.lock().unwrap();
        let res = f(&mut **w)?;
        w.flush()?;
        Ok(res)
    }
}
