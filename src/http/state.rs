//! Status/header state machine for one response.
//!
//! ```text
//!   Building ──commit──▶ HeadersSent ──finish──▶ Finished
//! ```
//!
//! Status and headers may be changed freely while `Building`. The first body
//! write commits them; from then on every mutation fails with
//! [`ResponseError::State`]. Abort is tracked on the [`SocketFacade`] and can
//! happen in any state.

use crate::error::{ResponseError, Result};
use crate::http::headers::HeaderTable;
use crate::http::socket::SocketFacade;
use crate::http::status::StatusCode;
use crate::http::transport::Transport;
use crate::http::writer;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Building,
    HeadersSent,
    Finished,
}

#[derive(Debug, Default)]
pub struct ResponseState {
    status: StatusCode,
    headers: HeaderTable,
    headers_sent: bool,
    finished: bool,
}

impl ResponseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.finished {
            Phase::Finished
        } else if self.headers_sent {
            Phase::HeadersSent
        } else {
            Phase::Building
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<()> {
        self.ensure_building("set status")?;
        self.status = status;
        Ok(())
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.ensure_building("set header")?;
        self.headers.set(name, value);
        Ok(())
    }

    /// Bulk assignment; every entry is applied as [`ResponseState::set_header`].
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.ensure_building("set headers")?;
        self.headers.extend(headers);
        Ok(())
    }

    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        self.ensure_building("append header")?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn remove_header(&mut self, name: &str) -> Result<()> {
        self.ensure_building("remove header")?;
        self.headers.remove(name);
        Ok(())
    }

    /// Sends the status line and headers. Only the first call writes anything.
    ///
    /// Must be called inside the transport's cork scope together with the
    /// first body write.
    pub(crate) fn commit_headers(&mut self, transport: &mut dyn Transport) -> bool {
        if self.headers_sent {
            return false;
        }
        if !self.status.is_bodyless() && !self.headers.contains("content-type") {
            self.headers.set("content-type", DEFAULT_CONTENT_TYPE);
        }
        writer::write_head(transport, self.status, &self.headers);
        self.headers_sent = true;
        true
    }

    /// The not-modified short-circuit: a bare 304 without the header table.
    pub(crate) fn commit_not_modified(&mut self, transport: &mut dyn Transport) {
        self.status = StatusCode::NOT_MODIFIED;
        transport.write_status(self.status);
        self.headers_sent = true;
    }

    /// Marks the response finished and closes the socket facade. Idempotent.
    pub fn finish(&mut self, socket: &SocketFacade) -> bool {
        if self.finished {
            return false;
        }
        self.headers_sent = true;
        self.finished = true;
        socket.close();
        true
    }

    fn ensure_building(&self, action: &'static str) -> Result<()> {
        if self.headers_sent {
            return Err(ResponseError::State(action));
        }
        Ok(())
    }
}
