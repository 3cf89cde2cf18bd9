//! [`Transport`] over a plain TCP stream.
//!
//! The head is buffered until the first body write so status line, headers
//! and the first body bytes leave in one segment. Body writes go straight to
//! the socket with `try_write`; whatever the kernel refuses is reported back
//! as backpressure instead of being buffered.

use std::io;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::http::status::StatusCode;
use crate::http::transport::{Transport, TryEnd};

/// Queued bytes above which [`Transport::write`] reports backpressure.
const HIGH_WATER_MARK: usize = 64 * 1024;

/// How the body is delimited, decided when the head is sealed.
#[derive(Debug, Clone, Copy)]
enum Framing {
    Length(u64),
    Bodyless,
    /// Body runs until the connection closes.
    UntilClose,
}

pub struct TcpTransport {
    stream: TcpStream,
    head: BytesMut,
    /// Bytes accepted from the response but not yet on the wire.
    outbox: BytesMut,
    written: u64,
    head_sealed: bool,
    closed: bool,
    keep_alive: bool,
    failure: Option<io::Error>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            head: BytesMut::with_capacity(512),
            outbox: BytesMut::new(),
            written: 0,
            head_sealed: false,
            closed: false,
            keep_alive: true,
            failure: None,
        }
    }

    /// Whether the connection can carry another response.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive && !self.closed && self.failure.is_none()
    }

    /// Clears per-response state before the next request on this connection.
    pub fn reset(&mut self) {
        self.head.clear();
        self.outbox.clear();
        self.written = 0;
        self.head_sealed = false;
    }

    pub(crate) async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        self.stream.read_buf(buf).await
    }

    fn seal_head(&mut self, framing: Framing) {
        if self.head_sealed {
            return;
        }
        match framing {
            Framing::Length(len) => self.head.extend_from_slice(format!("content-length: {len}\r\n").as_bytes()),
            Framing::Bodyless => {}
            Framing::UntilClose => {
                self.head.extend_from_slice(b"connection: close\r\n");
                self.keep_alive = false;
            }
        }
        self.head.extend_from_slice(b"\r\n");
        self.outbox.extend_from_slice(&self.head);
        self.head.clear();
        self.head_sealed = true;
    }

    /// Pushes as much of the outbox as the socket takes without waiting.
    /// Returns true once it is empty.
    fn drain_outbox(&mut self) -> bool {
        while !self.outbox.is_empty() {
            match self.stream.try_write(&self.outbox) {
                Ok(0) => {
                    self.failure = Some(io::ErrorKind::WriteZero.into());
                    return false;
                }
                Ok(n) => self.outbox.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
                Err(e) => {
                    self.failure = Some(e);
                    return false;
                }
            }
        }
        true
    }

    fn check(&mut self) -> Result<(), TransportError> {
        if let Some(err) = self.failure.take() {
            self.closed = true;
            return Err(err.into());
        }
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn write_status(&mut self, status: StatusCode) {
        self.head.clear();
        self.head.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason_phrase()).as_bytes(),
        );
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.head.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        self.seal_head(Framing::UntilClose);
        self.outbox.extend_from_slice(bytes);
        self.written += bytes.len() as u64;
        self.outbox.len() < HIGH_WATER_MARK
    }

    fn end(&mut self, bytes: &[u8]) {
        self.seal_head(Framing::Length(self.written + bytes.len() as u64));
        self.outbox.extend_from_slice(bytes);
        self.written += bytes.len() as u64;
    }

    fn end_without_body(&mut self, reported_length: Option<u64>) {
        match reported_length {
            Some(len) => self.seal_head(Framing::Length(len)),
            None => self.seal_head(Framing::Bodyless),
        }
    }

    fn try_end(&mut self, bytes: &[u8], total_size: u64) -> TryEnd {
        self.seal_head(Framing::Length(total_size));
        if self.closed || !self.drain_outbox() {
            return TryEnd::default();
        }

        let taken = match self.stream.try_write(bytes) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                self.failure = Some(e);
                0
            }
        };
        self.written += taken as u64;
        TryEnd {
            accepted: taken == bytes.len(),
            complete: taken == bytes.len() && self.written >= total_size,
        }
    }

    async fn writable(&mut self) -> Result<u64, TransportError> {
        self.check()?;
        while !self.drain_outbox() {
            self.check()?;
            self.stream.writable().await?;
        }
        self.check()?;
        self.stream.writable().await?;
        Ok(self.written)
    }

    fn write_offset(&self) -> u64 {
        self.written
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.check()?;
        let result = match self.stream.write_all(&self.outbox).await {
            Ok(()) => self.stream.flush().await,
            Err(e) => Err(e),
        };
        self.outbox.clear();
        if let Err(e) = result {
            self.closed = true;
            return Err(e.into());
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.keep_alive = false;
    }

    fn cork(&mut self, f: &mut dyn FnMut(&mut dyn Transport)) {
        f(self)
    }
}
