//! HTTP response emission.
//!
//! # Architecture
//!
//! - **`response`**: [`Response`](response::Response), the application-facing handle
//! - **`state`**: status/header state machine, commits the head exactly once
//! - **`writer`**: streams a [`BodySource`](source::BodySource) through a transport under backpressure
//! - **`transport`**: the flow-controlled write primitive responses are driven through
//! - **`socket`**: per-exchange lifecycle (abort, error, close) and its listeners
//! - **`file`**: `send_file`/`download`, with small files read off-thread by **`reader`**
//! - **`cookie`**, **`json`**, **`negotiate`**, **`encoding`**, **`mime`**: response helpers
//!
//! # Body path
//!
//! ```text
//!   send/json/end ──▶ one corked write ──────────────┐
//!                                                     ├─▶ Transport ──▶ finish
//!   stream/send_file ──▶ TransportWriter ──try_end──┘
//!                          ▲           │ rejected
//!                          └─writable──┘
//! ```

pub mod cookie;
pub mod encoding;
pub mod file;
pub mod headers;
pub mod json;
pub mod mime;
pub mod negotiate;
pub mod reader;
pub mod request;
pub mod response;
pub mod socket;
pub mod source;
pub mod state;
pub mod status;
pub mod transport;
pub mod writer;
