//! HTTP-like length-delimited transport: `Content-Length: <N>\r\n\r\n<body>`
//! framing over a line transport.

use std::io::{self, Read, Stdin, Write};

use super::{LineTransport, SharedWriter, Transport, TransportError, MAX_MESSAGE_LEN};

/// Smallest meaningful message body (an empty JSON object).
const MIN_MESSAGE_LEN: usize = 2;

/// Length-framed transport over stdio (or any byte stream).
pub struct HttpTransport<R: Read + Send> {
    inner: LineTransport<R>,
}

impl HttpTransport<Stdin> {
    /// Transport over the process stdin/stdout pair.
    pub fn stdio() -> Self {
        HttpTransport {
            inner: LineTransport::stdio(),
        }
    }
}

impl<R: Read + Send> HttpTransport<R> {
    pub fn over(reader: R, writer: SharedWriter) -> Self {
        HttpTransport {
            inner: LineTransport::over(reader, writer),
        }
    }
}

impl<R: Read + Send> Transport for HttpTransport<R> {
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        self.inner.read_line()
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        self.inner.read_exact(n)
    }

    fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        write_framed(&self.writer(), body)?;
        Ok(())
    }

    fn writer(&self) -> SharedWriter {
        self.inner.writer()
    }
}

/// Write one length-framed message atomically.
pub fn write_framed(writer: &SharedWriter, body: &[u8]) -> io::Result<()> {
    writer.with_locked(|w| {
        write!(w, "Content-Length: {}\r\n\r\n", body.len())?;
        w.write_all(body)
    })
}

/// Read one length-framed message: header lines up to an empty line, then
/// exactly `Content-Length` bytes of body. Only the `Content-Length` header
/// is recognized.
pub fn read_message(transport: &mut dyn Transport) -> Result<Vec<u8>, TransportError> {
    let mut content_length: Option<usize> = None;
    loop {
        let line = transport.read_line().map_err(|e| match e {
            // headers started but the blank delimiter never arrived
            TransportError::Closed if content_length.is_some() => {
                TransportError::MissingDelimiter
            }
            other => other,
        })?;
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) if name.trim().eq_ignore_ascii_case("Content-Length") => {
                let value = value.trim();
                let len: usize = value
                    .parse()
                    .map_err(|_| TransportError::BadLength(value.to_string()))?;
                content_length = Some(len);
            }
            _ => return Err(TransportError::UnknownHeader(line.to_string())),
        }
    }

    let len = content_length.ok_or(TransportError::MissingLength)?;
    if len < MIN_MESSAGE_LEN {
        return Err(TransportError::LengthTooSmall(len));
    }
    if len > MAX_MESSAGE_LEN {
        return Err(TransportError::LengthTooLarge(len));
    }
    transport.read_exact(len)
}
