#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use outflow::error::{ResponseError, TransportError};
use outflow::http::source::BodySource;
use outflow::http::status::StatusCode;
use outflow::http::transport::{Transport, TryEnd};

/// Everything a [`StubTransport`] was asked to do.
#[derive(Debug, Default)]
pub struct Log {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub ended: bool,
    pub reported_length: Option<u64>,
    pub closed: bool,
    pub corks: usize,
    pub try_end_calls: usize,
}

impl Log {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// In-memory transport with scriptable backpressure.
#[derive(Default)]
pub struct StubTransport {
    log: Arc<Mutex<Log>>,
    offset: u64,
    reject: usize,
    partial: usize,
    ack_override: Option<u64>,
    disconnect_on_writable: bool,
    flush_error: Option<io::ErrorKind>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `times` `try_end` calls, taking `partial` bytes of each.
    pub fn rejecting(mut self, times: usize, partial: usize) -> Self {
        self.reject = times;
        self.partial = partial;
        self
    }

    /// Makes the next `writable` report `offset` instead of the real one.
    pub fn acknowledging(mut self, offset: u64) -> Self {
        self.ack_override = Some(offset);
        self
    }

    pub fn disconnecting(mut self) -> Self {
        self.disconnect_on_writable = true;
        self
    }

    pub fn failing_flush(mut self, kind: io::ErrorKind) -> Self {
        self.flush_error = Some(kind);
        self
    }

    pub fn log_handle(&self) -> Arc<Mutex<Log>> {
        Arc::clone(&self.log)
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap()
    }
}

#[async_trait]
impl Transport for StubTransport {
    fn write_status(&mut self, status: StatusCode) {
        self.log().status = Some(status.as_u16());
    }

    fn write_header(&mut self, name: &str, value: &str) {
        self.log().headers.push((name.to_string(), value.to_string()));
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        self.log().body.extend_from_slice(bytes);
        self.offset += bytes.len() as u64;
        true
    }

    fn end(&mut self, bytes: &[u8]) {
        let mut log = self.log();
        log.body.extend_from_slice(bytes);
        log.ended = true;
        drop(log);
        self.offset += bytes.len() as u64;
    }

    fn end_without_body(&mut self, reported_length: Option<u64>) {
        let mut log = self.log();
        log.ended = true;
        log.reported_length = reported_length;
    }

    fn try_end(&mut self, bytes: &[u8], total_size: u64) -> TryEnd {
        let taken = if self.reject > 0 {
            self.reject -= 1;
            self.partial.min(bytes.len())
        } else {
            bytes.len()
        };

        self.offset += taken as u64;
        let accepted = taken == bytes.len();
        let complete = accepted && self.offset >= total_size;

        let mut log = self.log();
        log.try_end_calls += 1;
        log.body.extend_from_slice(&bytes[..taken]);
        if complete {
            log.ended = true;
        }
        TryEnd { accepted, complete }
    }

    async fn writable(&mut self) -> Result<u64, TransportError> {
        tokio::task::yield_now().await;
        if self.disconnect_on_writable {
            return Err(TransportError::Disconnected);
        }
        Ok(self.ack_override.take().unwrap_or(self.offset))
    }

    fn write_offset(&self) -> u64 {
        self.offset
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        match self.flush_error.take() {
            Some(kind) => Err(io::Error::from(kind).into()),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        self.log().closed = true;
    }

    fn cork(&mut self, f: &mut dyn FnMut(&mut dyn Transport)) {
        self.log().corks += 1;
        f(self)
    }
}

/// How a [`StubSource`] was released: `None` while alive, `Some(None)` on a
/// clean finish, `Some(Some(code))` when abandoned with an error.
pub type Destroyed = Arc<Mutex<Option<Option<String>>>>;

pub struct StubSource {
    chunks: VecDeque<Bytes>,
    fail: Option<io::ErrorKind>,
    hang: bool,
    pub destroyed: Destroyed,
}

impl StubSource {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            fail: None,
            hang: false,
            destroyed: Arc::default(),
        }
    }

    /// Fails with `kind` once the chunks run out.
    pub fn then_fail(mut self, kind: io::ErrorKind) -> Self {
        self.fail = Some(kind);
        self
    }

    /// Never ends once the chunks run out.
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn destroyed(&self) -> Destroyed {
        Arc::clone(&self.destroyed)
    }
}

#[async_trait]
impl BodySource for StubSource {
    async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Some(Ok(chunk));
        }
        if let Some(kind) = self.fail.take() {
            return Some(Err(io::Error::new(kind, "stub source failed")));
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        None
    }

    fn destroy(&mut self, reason: Option<&ResponseError>) {
        *self.destroyed.lock().unwrap() = Some(reason.map(|e| e.code().to_string()));
    }
}
