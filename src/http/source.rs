//! Upstream byte sources for streamed bodies.
//!
//! Sources are pull-based: the writer pauses a source simply by not asking for
//! the next chunk, and resumes it by asking again.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::io::ReaderStream;

use crate::error::ResponseError;

#[async_trait]
pub trait BodySource: Send {
    /// Produces the next chunk, or `None` once the source is exhausted.
    async fn next_chunk(&mut self) -> Option<io::Result<Bytes>>;

    /// Releases the source. `reason` is set when the body is abandoned, and is
    /// the abort-tagged error when the peer went away.
    fn destroy(&mut self, reason: Option<&ResponseError>);

    /// Name used when a read failure is reported.
    fn describe(&self) -> PathBuf {
        PathBuf::from("<stream>")
    }
}

/// Adapts any `Stream` of byte chunks.
pub struct StreamSource<S> {
    inner: Option<S>,
}

impl<S> StreamSource<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: Some(stream),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_none()
    }
}

#[async_trait]
impl<S> BodySource for StreamSource<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin + Send,
{
    async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        self.inner.as_mut()?.next().await
    }

    fn destroy(&mut self, reason: Option<&ResponseError>) {
        if let Some(err) = reason {
            tracing::debug!(error = %err, "destroying body stream");
        }
        self.inner = None;
    }
}

/// Reads a file from disk in fixed-size chunks.
pub struct FileSource {
    path: PathBuf,
    stream: Option<ReaderStream<tokio::fs::File>>,
}

impl FileSource {
    pub async fn open(path: &Path, chunk_size: usize) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            stream: Some(ReaderStream::with_capacity(file, chunk_size.max(1))),
        })
    }
}

#[async_trait]
impl BodySource for FileSource {
    async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        self.stream.as_mut()?.next().await
    }

    fn destroy(&mut self, reason: Option<&ResponseError>) {
        if self.stream.take().is_some() {
            match reason {
                Some(err) => tracing::debug!(path = %self.path.display(), error = %err, "file stream destroyed"),
                None => tracing::trace!(path = %self.path.display(), "file stream closed"),
            }
        }
    }

    fn describe(&self) -> PathBuf {
        self.path.clone()
    }
}
