use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use percent_encoding::percent_decode_str;

use crate::config::Config;
use crate::error::ResponseError;
use crate::http::file::SendFileOptions;
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::status::{StatusCode, error_page};
use crate::server::parser::{ParseError, parse_http_request};
use crate::server::tcp::TcpTransport;

pub struct Connection {
    transport: TcpTransport,
    buffer: BytesMut,
    state: ConnectionState,
    config: Arc<Config>,
}

pub enum ConnectionState {
    Reading,
    Responding(Request),
    Closed,
}

impl Connection {
    pub fn new(transport: TcpTransport, config: Arc<Config>) -> Self {
        Self {
            transport,
            buffer: BytesMut::with_capacity(4096),
            state: ConnectionState::Reading,
            config,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        Some(req) => ConnectionState::Responding(req),
                        None => ConnectionState::Closed,
                    };
                }

                ConnectionState::Responding(req) => {
                    let wants_keep_alive = req.keep_alive();
                    self.respond(req).await?;

                    if wants_keep_alive && self.transport.keep_alive() {
                        self.transport.reset();
                        self.state = ConnectionState::Reading;
                    }
                }

                ConnectionState::Closed => break,
            }
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> anyhow::Result<Option<Request>> {
        loop {
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(Some(request));
                }
                Err(ParseError::Incomplete) => {}
                Err(e) => return Err(anyhow::anyhow!("HTTP parse error: {:?}", e)),
            }

            let n = self.transport.read(&mut self.buffer).await?;
            if n == 0 {
                // Client closed connection
                return Ok(None);
            }
        }
    }

    async fn respond(&mut self, req: Request) -> anyhow::Result<()> {
        let method = req.method.clone();
        let path = req.path.clone();
        let mut response = Response::with_config(&mut self.transport, req, Arc::clone(&self.config));

        let result = match method {
            Method::GET | Method::HEAD => serve_static(&mut response, &self.config.static_root, &path).await,
            _ => {
                response.set("allow", "GET, HEAD")?;
                response.send_status(StatusCode::METHOD_NOT_ALLOWED.as_u16()).await
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(method = ?method, path = %path, status = response.status_code().as_u16(), "request served");
                Ok(())
            }
            Err(e) if e.is_aborted() => {
                tracing::debug!(path = %path, "client went away mid-response");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Maps the request path onto `root`, falling back to `index.html` for
/// directories, and answers failures with an HTML error page.
async fn serve_static(response: &mut Response<&mut TcpTransport>, root: &Path, path: &str) -> Result<(), ResponseError> {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let target = if decoded.ends_with('/') {
        format!("{decoded}index.html")
    } else {
        decoded.into_owned()
    };

    let options = SendFileOptions::new().root(root);
    match response.send_file(&target, options).await {
        Err(e) if !e.is_aborted() && !response.headers_sent() => {
            tracing::debug!(path = %path, error = %e, "static file not served");
            let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let detail = if status == StatusCode::NOT_FOUND {
                format!("Cannot GET {path}")
            } else {
                status.reason_phrase().to_string()
            };
            response.status(status.as_u16())?;
            response.set("content-type", "text/html; charset=utf-8")?;
            response.send(error_page(status, &detail)).await
        }
        other => other,
    }
}
