//! Line-oriented transport over the process stdio streams.

use std::io::{self, BufRead, BufReader, Read, Stdin};

use super::{SharedWriter, Transport, TransportError};

/// One request per `\n`-terminated line, replies written raw and flushed.
pub struct LineTransport<R: Read + Send> {
    reader: BufReader<R>,
    writer: SharedWriter,
}

impl LineTransport<Stdin> {
    /// Transport over the process stdin/stdout pair.
    pub fn stdio() -> Self {
        Self::over(io::stdin(), SharedWriter::new(io::stdout()))
    }
}

impl<R: Read + Send> LineTransport<R> {
    pub fn over(reader: R, writer: SharedWriter) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }
}

impl<R: Read + Send> Transport for LineTransport<R> {
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::new();
        let read_n = self.reader.read_until(b'\n', &mut buf)?;
        if read_n == 0 {
            return Err(TransportError::Closed);
        }
        Ok(buf)
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                TransportError::Closed
            } else {
                TransportError::Io(e)
            }
        })?;
        Ok(buf)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writer.send(bytes)?;
        Ok(())
    }

    fn writer(&self) -> SharedWriter {
        self.writer.clone()
    }
}
