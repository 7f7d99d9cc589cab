//! Ordered line channel between the client and a tool server.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::ProtocolError;

/// Result of waiting for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    Line(String),
    TimedOut,
    Closed,
}

/// A bidirectional, ordered, line-oriented channel.
pub trait Transport {
    /// Send one envelope line (no trailing newline).
    fn send(&mut self, line: &str) -> Result<(), ProtocolError>;

    /// Wait up to `timeout` for the next line.
    fn recv(&mut self, timeout: Duration) -> Result<Recv, ProtocolError>;
}

/// Transport over any writer plus a background reader thread.
///
/// The reader thread owns the read half and forwards complete lines over a
/// channel, so a silent peer turns into `Recv::TimedOut` instead of a block.
pub struct ChannelTransport {
    writer: Option<Box<dyn Write + Send>>,
    lines: Receiver<std::io::Result<String>>,
}

impl ChannelTransport {
    pub fn new<W, R>(writer: W, reader: R) -> Self
    where
        W: Write + Send + 'static,
        R: Read + Send + 'static,
    {
        Self {
            writer: Some(Box::new(writer)),
            lines: spawn_line_reader(reader),
        }
    }

    /// Build from an already running line source.
    pub fn from_parts(
        writer: Box<dyn Write + Send>,
        lines: Receiver<std::io::Result<String>>,
    ) -> Self {
        Self {
            writer: Some(writer),
            lines,
        }
    }

    /// Drop the write half so the peer sees end of input.
    pub fn close_writer(&mut self) {
        self.writer = None;
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, line: &str) -> Result<(), ProtocolError> {
        let writer = self.writer.as_mut().ok_or(ProtocolError::ChannelClosed)?;
        let io_err = |err: std::io::Error| ProtocolError::Io {
            detail: err.to_string(),
        };
        writer.write_all(line.as_bytes()).map_err(io_err)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Recv, ProtocolError> {
        match self.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(Recv::Line(line)),
            Ok(Err(err)) => Err(ProtocolError::Io {
                detail: err.to_string(),
            }),
            Err(RecvTimeoutError::Timeout) => Ok(Recv::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Ok(Recv::Closed),
        }
    }
}

/// Forward complete lines from `reader` until EOF or a read error.
pub fn spawn_line_reader<R>(reader: R) -> Receiver<std::io::Result<String>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    debug!("tool channel reached eof");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(Ok(trimmed)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn channel_transport_reads_lines_then_reports_closed() {
        let input = Cursor::new(b"{\"a\":1}\n{\"b\":2}\n".to_vec());
        let mut transport = ChannelTransport::new(Vec::new(), input);
        let timeout = Duration::from_secs(5);
        assert_eq!(
            transport.recv(timeout).expect("recv"),
            Recv::Line("{\"a\":1}".to_string())
        );
        assert_eq!(
            transport.recv(timeout).expect("recv"),
            Recv::Line("{\"b\":2}".to_string())
        );
        assert_eq!(transport.recv(timeout).expect("recv"), Recv::Closed);
    }

    #[test]
    fn send_after_close_is_channel_closed() {
        let mut transport = ChannelTransport::new(Vec::new(), Cursor::new(Vec::new()));
        transport.close_writer();
        assert_eq!(transport.send("{}"), Err(ProtocolError::ChannelClosed));
    }
}
