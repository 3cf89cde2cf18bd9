//! The low-level write primitive a response is driven through.
//!
//! A transport only exposes partial, flow-controlled writes: [`Transport::try_end`]
//! reports whether the bytes were fully accepted, and when they were not the
//! caller must await [`Transport::writable`] before retrying with whatever the
//! acknowledged offset says is still unwritten.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::status::StatusCode;

/// Outcome of a [`Transport::try_end`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TryEnd {
    /// Every byte handed to the call was taken by the transport.
    pub accepted: bool,
    /// The transport has now seen the whole declared body.
    pub complete: bool,
}

#[async_trait]
pub trait Transport: Send {
    fn write_status(&mut self, status: StatusCode);

    fn write_header(&mut self, name: &str, value: &str);

    /// Writes body bytes without ending the response. Returns false under
    /// backpressure; the bytes are still queued.
    fn write(&mut self, bytes: &[u8]) -> bool;

    /// Queues the final body bytes and ends the response.
    fn end(&mut self, bytes: &[u8]);

    /// Ends the response with no body, optionally reporting the length a
    /// body would have had (HEAD).
    fn end_without_body(&mut self, reported_length: Option<u64>);

    /// Attempts to write part of a body of `total_size` bytes.
    fn try_end(&mut self, bytes: &[u8], total_size: u64) -> TryEnd;

    /// Waits until previously rejected bytes drained and returns the body
    /// offset acknowledged so far.
    async fn writable(&mut self) -> Result<u64, TransportError>;

    /// Body bytes accepted so far.
    fn write_offset(&self) -> u64;

    /// Drives anything queued by [`Transport::end`] out to the peer.
    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Forcefully closes the connection.
    fn close(&mut self);

    /// Runs `f` with writes batched so they reach the peer as one unit.
    ///
    /// Transports that buffer the head until the first body write satisfy this
    /// by calling `f(self)` directly.
    fn cork(&mut self, f: &mut dyn FnMut(&mut dyn Transport));
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &mut T {
    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    fn write_header(&mut self, name: &str, value: &str) {
        (**self).write_header(name, value)
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        (**self).write(bytes)
    }

    fn end(&mut self, bytes: &[u8]) {
        (**self).end(bytes)
    }

    fn end_without_body(&mut self, reported_length: Option<u64>) {
        (**self).end_without_body(reported_length)
    }

    fn try_end(&mut self, bytes: &[u8], total_size: u64) -> TryEnd {
        (**self).try_end(bytes, total_size)
    }

    async fn writable(&mut self) -> Result<u64, TransportError> {
        (**self).writable().await
    }

    fn write_offset(&self) -> u64 {
        (**self).write_offset()
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush().await
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn cork(&mut self, f: &mut dyn FnMut(&mut dyn Transport)) {
        (**self).cork(f)
    }
}
