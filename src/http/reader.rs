//! Off-thread whole-file reads.
//!
//! A single dedicated worker thread serves read requests from a bounded
//! queue. Every request carries a key from a 64-bit counter; the worker
//! replies by key, and the reply is routed to the caller waiting on it. The
//! worker is detached: it never blocks process shutdown.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ResponseError, Result};

pub const DEFAULT_QUEUE_DEPTH: usize = 64;

struct ReadRequest {
    key: u64,
    path: PathBuf,
}

/// What the worker sends back: the bytes, or the error kind and its message.
type ReadOutcome = std::result::Result<Bytes, (io::ErrorKind, String)>;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ReadOutcome>>>>;

#[derive(Clone)]
pub struct FileReader {
    requests: mpsc::Sender<ReadRequest>,
    pending: Pending,
    next_key: Arc<AtomicU64>,
}

impl FileReader {
    /// Starts a worker thread with a queue of `queue_depth` requests.
    pub fn spawn(queue_depth: usize) -> io::Result<Self> {
        let (requests, mut rx) = mpsc::channel::<ReadRequest>(queue_depth.max(1));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let replies = Arc::clone(&pending);

        thread::Builder::new()
            .name("outflow-file-reader".to_string())
            .spawn(move || {
                while let Some(request) = rx.blocking_recv() {
                    let outcome = std::fs::read(&request.path)
                        .map(Bytes::from)
                        .map_err(|e| (e.kind(), e.to_string()));
                    deliver(&replies, request.key, outcome);
                }
                tracing::debug!("file reader worker stopped");
            })?;

        Ok(Self {
            requests,
            pending,
            next_key: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Reads the whole file at `path` on the worker thread.
    pub async fn read(&self, path: &Path) -> Result<Bytes> {
        // Hold a queue slot before registering, so a caller dropped while the
        // queue is full leaves nothing behind in `pending`.
        let Ok(permit) = self.requests.reserve().await else {
            return Err(stopped(path));
        };

        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(key, tx);
        permit.send(ReadRequest {
            key,
            path: path.to_path_buf(),
        });

        match rx.await {
            Ok(Ok(bytes)) => {
                tracing::trace!(key, path = %path.display(), len = bytes.len(), "off-thread read complete");
                Ok(bytes)
            }
            Ok(Err((kind, message))) => Err(ResponseError::FileRead {
                path: path.to_path_buf(),
                message,
                not_found: kind == io::ErrorKind::NotFound,
            }),
            Err(_) => Err(stopped(path)),
        }
    }

    /// Reads still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn deliver(pending: &Pending, key: u64, outcome: ReadOutcome) {
    let waiter = lock(pending).remove(&key);
    match waiter {
        // A dropped receiver means the caller gave up (aborted response).
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => tracing::warn!(key, "read reply with no waiting caller"),
    }
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<ReadOutcome>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn stopped(path: &Path) -> ResponseError {
    ResponseError::FileRead {
        path: path.to_path_buf(),
        message: "file reader worker is not running".to_string(),
        not_found: false,
    }
}

static GLOBAL: OnceLock<Option<FileReader>> = OnceLock::new();

/// Creates the process-wide reader. Later calls return the existing one.
///
/// No reader is created on a single-CPU host, where an extra thread would
/// only compete with the one serving responses.
pub fn init(queue_depth: usize) -> Option<FileReader> {
    GLOBAL
        .get_or_init(|| {
            let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            if cpus <= 1 {
                tracing::info!("single CPU available, files will always be streamed");
                return None;
            }
            match FileReader::spawn(queue_depth) {
                Ok(reader) => Some(reader),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to start file reader worker");
                    None
                }
            }
        })
        .clone()
}

/// The process-wide reader, created with default settings on first use.
pub fn global() -> Option<FileReader> {
    init(DEFAULT_QUEUE_DEPTH)
}
