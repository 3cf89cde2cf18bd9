//! Per-exchange lifecycle handle.
//!
//! A [`SocketFacade`] mirrors the transport's lifecycle for exactly one
//! response. Transitions are one-way: once closed, the facade never becomes
//! writable again, and each of the abort, error and close transitions fires its
//! listeners at most once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::ResponseError;

/// Where a socket facade is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    /// The peer went away. Implies closed.
    Aborted,
    /// A transport or source failure forced the connection down. Implies closed.
    Errored,
    /// Closed after a normal finish.
    Closed,
}

/// A lifecycle transition, as reported to tracing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Error(String),
    Close,
    /// The transport acknowledged bytes up to this body offset.
    WritableResumed(u64),
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    aborted: bool,
    errored: bool,
    closed: bool,
}

type Listener = Box<dyn FnOnce() + Send>;
type ErrorListener = Box<dyn FnOnce(&ResponseError) + Send>;

#[derive(Default)]
struct Listeners {
    abort: Vec<Listener>,
    close: Vec<Listener>,
    error: Vec<ErrorListener>,
}

struct Inner {
    flags: watch::Sender<Flags>,
    listeners: Mutex<Listeners>,
    acknowledged: AtomicU64,
}

/// Cloneable handle shared between a response and whoever observes its peer.
#[derive(Clone)]
pub struct SocketFacade {
    inner: Arc<Inner>,
}

impl SocketFacade {
    pub fn new() -> Self {
        let (flags, _) = watch::channel(Flags::default());
        Self {
            inner: Arc::new(Inner {
                flags,
                listeners: Mutex::new(Listeners::default()),
                acknowledged: AtomicU64::new(0),
            }),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let flags = *self.inner.flags.borrow();
        if flags.aborted {
            Lifecycle::Aborted
        } else if flags.errored {
            Lifecycle::Errored
        } else if flags.closed {
            Lifecycle::Closed
        } else {
            Lifecycle::Open
        }
    }

    /// False once the facade closed, for any reason.
    pub fn is_writable(&self) -> bool {
        !self.inner.flags.borrow().closed
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.flags.borrow().aborted
    }

    /// Highest body offset the transport has acknowledged after a resume.
    pub fn acknowledged(&self) -> u64 {
        self.inner.acknowledged.load(Ordering::Acquire)
    }

    /// Registers a handler run when the peer aborts.
    pub fn on_abort(&self, f: impl FnOnce() + Send + 'static) {
        let mut listeners = self.listeners();
        if self.is_aborted() {
            drop(listeners);
            f();
            return;
        }
        listeners.abort.push(Box::new(f));
    }

    /// Registers a handler run when the facade closes. Runs immediately if it
    /// already has.
    pub fn on_close(&self, f: impl FnOnce() + Send + 'static) {
        let mut listeners = self.listeners();
        if !self.is_writable() {
            drop(listeners);
            f();
            return;
        }
        listeners.close.push(Box::new(f));
    }

    /// Registers a handler run when an error tears the connection down.
    ///
    /// Unlike [`SocketFacade::on_abort`] and [`SocketFacade::on_close`], a
    /// handler registered once the facade is closed is dropped without
    /// running: the error is only borrowed for the duration of the
    /// transition. Late observers check [`SocketFacade::lifecycle`] for
    /// [`Lifecycle::Errored`] instead.
    pub fn on_error(&self, f: impl FnOnce(&ResponseError) + Send + 'static) {
        let mut listeners = self.listeners();
        // Once closed, no error transition can follow.
        if !self.is_writable() {
            return;
        }
        listeners.error.push(Box::new(f));
    }

    /// Marks the peer as gone. Returns false if the facade was already closed.
    pub fn abort(&self) -> bool {
        let fired = self.inner.flags.send_if_modified(|flags| {
            if flags.closed {
                return false;
            }
            flags.aborted = true;
            true
        });
        if !fired {
            return false;
        }

        tracing::warn!(code = crate::error::ABORT_CODE, "peer aborted response");
        let listeners = std::mem::take(&mut self.listeners().abort);
        for listener in listeners {
            listener();
        }
        self.close();
        true
    }

    /// Reports a failure that forces the connection closed.
    pub fn error(&self, err: &ResponseError) -> bool {
        let fired = self.inner.flags.send_if_modified(|flags| {
            if flags.closed || flags.errored {
                return false;
            }
            flags.errored = true;
            true
        });
        if !fired {
            return false;
        }

        tracing::debug!(event = ?SocketEvent::Error(err.to_string()), "socket transition");
        let listeners = std::mem::take(&mut self.listeners().error);
        for listener in listeners {
            listener(err);
        }
        self.close();
        true
    }

    /// Closes the facade. Only the first call has any effect.
    pub fn close(&self) -> bool {
        let fired = self.inner.flags.send_if_modified(|flags| {
            if flags.closed {
                return false;
            }
            flags.closed = true;
            true
        });
        if !fired {
            return false;
        }

        tracing::trace!(event = ?SocketEvent::Close, "socket transition");
        let listeners = std::mem::take(&mut self.listeners().close);
        for listener in listeners {
            listener();
        }
        true
    }

    pub(crate) fn resumed(&self, offset: u64) {
        self.inner.acknowledged.fetch_max(offset, Ordering::AcqRel);
        tracing::trace!(event = ?SocketEvent::WritableResumed(offset), "socket transition");
    }

    /// Resolves once the peer aborts. Pending forever on a normal close.
    pub async fn aborted(&self) {
        let mut rx = self.inner.flags.subscribe();
        let seen = rx.wait_for(|flags| flags.aborted).await.map(|_| ());
        if seen.is_err() {
            std::future::pending::<()>().await;
        }
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SocketFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SocketFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketFacade")
            .field("lifecycle", &self.lifecycle())
            .field("acknowledged", &self.acknowledged())
            .finish()
    }
}
