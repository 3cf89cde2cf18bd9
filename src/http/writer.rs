use bytes::Bytes;

use crate::error::{ResponseError, Result, TransportError};
use crate::http::headers::HeaderTable;
use crate::http::socket::SocketFacade;
use crate::http::source::BodySource;
use crate::http::state::ResponseState;
use crate::http::status::StatusCode;
use crate::http::transport::{Transport, TryEnd};

/// Writes the status line and every header except `content-length`, which
/// the transport derives from the body itself.
pub(crate) fn write_head(transport: &mut dyn Transport, status: StatusCode, headers: &HeaderTable) {
    transport.write_status(status);

    let mut written = 0usize;
    for (name, value) in headers.iter() {
        if name == "content-length" {
            continue;
        }
        transport.write_header(name, value);
        written += 1;
    }

    tracing::debug!(status = status.as_u16(), headers = written, "response head committed");
}

/// A chunk the transport only partly accepted.
#[derive(Debug)]
struct PendingChunk {
    buffer: Bytes,
    /// Body offset of `buffer[0]`.
    offset: u64,
}

impl PendingChunk {
    /// The part of the chunk still unwritten once `acknowledged` body bytes
    /// are on the wire.
    fn remainder(&self, acknowledged: u64) -> std::result::Result<Bytes, TransportError> {
        let end = self.offset + self.buffer.len() as u64;
        if acknowledged < self.offset || acknowledged > end {
            return Err(TransportError::OffsetRegression {
                start: self.offset,
                end,
                acknowledged,
            });
        }
        Ok(self.buffer.slice((acknowledged - self.offset) as usize..))
    }
}

enum Step {
    Continue,
    Complete,
}

/// Streams one body through a transport, one chunk in flight at a time.
///
/// The writer never asks the source for chunk N+1 until the transport has
/// taken every byte of chunk N, so the only bookkeeping it needs is the body
/// offset at which the pending chunk was first offered.
pub struct TransportWriter<'a> {
    transport: &'a mut dyn Transport,
    state: &'a mut ResponseState,
    socket: &'a SocketFacade,
    total_size: u64,
    pending: Option<PendingChunk>,
}

impl<'a> TransportWriter<'a> {
    pub(crate) fn new(
        transport: &'a mut dyn Transport,
        state: &'a mut ResponseState,
        socket: &'a SocketFacade,
        total_size: u64,
    ) -> Self {
        Self {
            transport,
            state,
            socket,
            total_size,
            pending: None,
        }
    }

    /// Drives `source` to completion.
    pub(crate) async fn pipe<S>(mut self, source: &mut S) -> Result<()>
    where
        S: BodySource + ?Sized,
    {
        loop {
            if self.socket.is_aborted() {
                return Err(self.abandon(source));
            }

            let next = tokio::select! {
                biased;
                _ = self.socket.aborted() => return Err(self.abandon(source)),
                next = source.next_chunk() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    let err = ResponseError::file_read(source.describe(), &err);
                    return Err(self.fail(source, err));
                }
                None => return self.source_ended(source).await,
            };

            if self.socket.is_aborted() {
                return Err(self.abandon(source));
            }
            if chunk.is_empty() {
                continue;
            }

            let reached = self.transport.write_offset() + chunk.len() as u64;
            if reached > self.total_size {
                let err = TransportError::BodyOverrun {
                    written: reached,
                    expected: self.total_size,
                };
                return Err(self.fail(source, err.into()));
            }

            match self.write_chunk(chunk).await {
                Ok(Step::Continue) => {}
                Ok(Step::Complete) => {
                    source.destroy(None);
                    self.state.finish(self.socket);
                    return Ok(());
                }
                Err(err) if err.is_aborted() => return Err(self.abandon(source)),
                Err(err) => return Err(self.fail(source, err)),
            }
        }
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<Step> {
        let total = self.total_size;
        let state = &mut *self.state;
        let mut pause_offset = 0;
        let mut attempt = TryEnd::default();

        self.transport.cork(&mut |t| {
            state.commit_headers(t);
            pause_offset = t.write_offset();
            attempt = t.try_end(&chunk, total);
        });

        if attempt.complete {
            return Ok(Step::Complete);
        }
        if attempt.accepted {
            return Ok(Step::Continue);
        }

        tracing::trace!(offset = pause_offset, len = chunk.len(), "transport backpressure, pausing source");
        self.pending = Some(PendingChunk {
            buffer: chunk,
            offset: pause_offset,
        });
        self.drain_pending().await
    }

    /// Retries the pending chunk each time the transport reports progress.
    async fn drain_pending(&mut self) -> Result<Step> {
        let total = self.total_size;
        loop {
            let acknowledged = tokio::select! {
                biased;
                _ = self.socket.aborted() => return Err(ResponseError::aborted()),
                acked = self.transport.writable() => acked,
            };
            let acknowledged = match acknowledged {
                Ok(offset) => offset,
                Err(err) if err.is_disconnect() => {
                    self.socket.abort();
                    return Err(ResponseError::aborted());
                }
                Err(err) => return Err(err.into()),
            };

            if self.socket.is_aborted() || self.state.is_finished() {
                return Err(ResponseError::aborted());
            }
            self.socket.resumed(acknowledged);

            let rest = match &self.pending {
                Some(pending) => pending.remainder(acknowledged)?,
                None => return Ok(Step::Continue),
            };
            let retry = self.transport.try_end(&rest, total);

            if retry.complete {
                self.pending = None;
                return Ok(Step::Complete);
            }
            if retry.accepted {
                tracing::trace!(offset = self.transport.write_offset(), "pending chunk drained, resuming source");
                self.pending = None;
                return Ok(Step::Continue);
            }
        }
    }

    async fn source_ended<S>(&mut self, source: &mut S) -> Result<()>
    where
        S: BodySource + ?Sized,
    {
        let written = self.transport.write_offset();
        if written < self.total_size {
            let err = TransportError::ShortBody {
                written,
                expected: self.total_size,
            };
            return Err(self.fail(source, err.into()));
        }

        // Only reachable for an empty body: a non-empty one completes in try_end.
        let state = &mut *self.state;
        self.transport.cork(&mut |t| {
            state.commit_headers(t);
            t.end(&[]);
        });
        if let Err(err) = self.transport.flush().await {
            return Err(self.fail(source, err.into()));
        }
        source.destroy(None);
        self.state.finish(self.socket);
        Ok(())
    }

    /// Peer went away: stop the source with the abort-tagged error and leave
    /// the transport alone.
    fn abandon<S>(&mut self, source: &mut S) -> ResponseError
    where
        S: BodySource + ?Sized,
    {
        let err = ResponseError::aborted();
        source.destroy(Some(&err));
        self.pending = None;
        err
    }

    fn fail<S>(&mut self, source: &mut S, err: ResponseError) -> ResponseError
    where
        S: BodySource + ?Sized,
    {
        tracing::warn!(error = %err, "streamed body failed");
        source.destroy(Some(&err));
        self.pending = None;
        if !self.state.is_finished() {
            self.transport.close();
            self.socket.error(&err);
        }
        err
    }
}
