use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{ResponseError, Result, TransportError};
use crate::http::cookie::{self, CookieOptions};
use crate::http::encoding::{content_disposition, encode_url, escape_html};
use crate::http::file::{ServePolicy, SmallFilePolicy};
use crate::http::json;
use crate::http::mime;
use crate::http::negotiate::Format;
use crate::http::reader::{self, FileReader};
use crate::http::request::{Method, Request};
use crate::http::socket::SocketFacade;
use crate::http::source::BodySource;
use crate::http::state::ResponseState;
use crate::http::status::{StatusCode, error_page};
use crate::http::transport::Transport;
use crate::http::writer::TransportWriter;

/// A body handed to [`Response::send`].
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    /// Defaults the content type to HTML.
    Text(String),
    /// Defaults the content type to `application/octet-stream`.
    Bytes(Bytes),
    /// Encoded the same way as [`Response::json`].
    Json(serde_json::Value),
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Body::Json(v)
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

/// One outbound HTTP response, bound to one transport and one socket facade.
///
/// Status and headers stay mutable until the first body byte is handed to
/// the transport; every terminal operation (`send`, `json`, `send_file`,
/// ...) commits them exactly once.
pub struct Response<T: Transport> {
    pub(crate) transport: T,
    pub(crate) socket: SocketFacade,
    pub(crate) state: ResponseState,
    pub(crate) request: Request,
    pub(crate) config: Arc<Config>,
    pub(crate) reader: Option<FileReader>,
    pub(crate) policy: Arc<dyn ServePolicy>,
    secret: Option<String>,
}

impl<T: Transport> Response<T> {
    pub fn new(transport: T, request: Request) -> Self {
        Self::with_config(transport, request, Arc::new(Config::default()))
    }

    pub fn with_config(transport: T, request: Request, config: Arc<Config>) -> Self {
        let reader = if config.files.offload_reads {
            reader::init(config.files.read_queue_depth)
        } else {
            None
        };
        let policy = Arc::new(SmallFilePolicy {
            threshold: config.files.small_file_threshold,
        });

        Self {
            transport,
            socket: SocketFacade::new(),
            state: ResponseState::new(),
            request,
            secret: config.response.cookie_secret.clone(),
            config,
            reader,
            policy,
        }
    }

    /// Replaces the off-thread reader; `None` forces every file to stream.
    pub fn with_reader(mut self, reader: Option<FileReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_policy(mut self, policy: impl ServePolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Secret used to sign cookies for this exchange.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn socket(&self) -> &SocketFacade {
        &self.socket
    }

    pub fn state(&self) -> &ResponseState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn status_code(&self) -> StatusCode {
        self.state.status()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.state.header(name)
    }

    pub fn headers_sent(&self) -> bool {
        self.state.headers_sent()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn is_aborted(&self) -> bool {
        self.socket.is_aborted()
    }

    pub fn status(&mut self, code: u16) -> Result<&mut Self> {
        let status = StatusCode::from_u16(code)
            .ok_or_else(|| ResponseError::InvalidArgument(format!("invalid status code: {code}")))?;
        self.state.set_status(status)?;
        Ok(self)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.state.set_header(name, value)?;
        Ok(self)
    }

    pub fn set_all<I, K, V>(&mut self, headers: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.state.set_headers(headers)?;
        Ok(self)
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self> {
        self.state.append_header(name, value)?;
        Ok(self)
    }

    pub fn remove(&mut self, name: &str) -> Result<&mut Self> {
        self.state.remove_header(name)?;
        Ok(self)
    }

    /// Sets `Content-Type` from a MIME type or a short name such as `"json"`.
    pub fn content_type(&mut self, ty: &str) -> Result<&mut Self> {
        let value = if ty.contains('/') {
            ty.to_string()
        } else {
            mime::with_charset(&mime::normalize(ty))
        };
        self.set("content-type", value)
    }

    /// Adds `field` to the `Vary` header unless it is already covered.
    pub fn vary(&mut self, field: &str) -> Result<&mut Self> {
        if self.state.headers_sent() {
            return Err(ResponseError::State("set vary"));
        }
        let current = self.state.header("vary").unwrap_or_default().to_string();
        let updated = append_vary(&current, field);
        if updated != current {
            self.state.set_header("vary", updated)?;
        }
        Ok(self)
    }

    /// Appends `<url>; rel="rel"` entries to the `Link` header.
    pub fn links(&mut self, links: &[(&str, &str)]) -> Result<&mut Self> {
        let mut value = self.state.header("link").unwrap_or_default().to_string();
        for (rel, url) in links {
            if !value.is_empty() {
                value.push_str(", ");
            }
            value.push_str(&format!("<{url}>; rel=\"{rel}\""));
        }
        self.set("link", value)
    }

    /// Marks the body as a download, typing it from `filename` if given.
    pub fn attachment(&mut self, filename: Option<&str>) -> Result<&mut Self> {
        let name = filename.map(basename);
        if let Some(name) = name {
            if !self.state.headers().contains("content-type") {
                self.state
                    .set_header("content-type", mime::for_path(std::path::Path::new(name)))?;
            }
        }
        self.set("content-disposition", content_disposition("attachment", name))
    }

    /// Sets `Location`. `"back"` means the referrer, or `/` without one.
    pub fn location(&mut self, url: &str) -> Result<&mut Self> {
        let target = if url == "back" {
            self.request.referrer().unwrap_or("/").to_string()
        } else {
            url.to_string()
        };
        self.set("location", encode_url(&target))
    }

    pub fn cookie(&mut self, name: &str, value: &str, options: &CookieOptions) -> Result<&mut Self> {
        let header = cookie::build(name, value, options, self.secret.as_deref(), Utc::now())?;
        self.append("set-cookie", header)
    }

    /// Expires a cookie previously set with the same name and path.
    pub fn clear_cookie(&mut self, name: &str, options: &CookieOptions) -> Result<&mut Self> {
        let header = cookie::build(name, "", &cookie::clearing(options), None, Utc::now())?;
        self.append("set-cookie", header)
    }

    /// Sends a complete body.
    pub async fn send(&mut self, body: impl Into<Body>) -> Result<()> {
        self.ensure_sendable("send")?;

        let bytes = match body.into() {
            Body::Json(value) => {
                let text = json::stringify(&value, self.config.response.json_spaces, self.config.response.json_escape)?;
                if !self.state.headers().contains("content-type") {
                    self.state.set_header("content-type", "application/json; charset=utf-8")?;
                }
                Bytes::from(text)
            }
            Body::Empty => Bytes::new(),
            Body::Text(text) => {
                if !self.state.headers().contains("content-type") {
                    self.state.set_header("content-type", "text/html; charset=utf-8")?;
                }
                Bytes::from(text)
            }
            Body::Bytes(bytes) => {
                if !self.state.headers().contains("content-type") {
                    self.state.set_header("content-type", mime::OCTET_STREAM)?;
                }
                bytes
            }
        };

        if self.config.response.etag && !bytes.is_empty() && !self.state.headers().contains("etag") {
            self.state.set_header("etag", weak_etag(&bytes))?;
        }
        self.deliver(bytes, true, None).await
    }

    /// Ends the response with `data` and no content-type handling. After
    /// [`Response::write`] this only appends the final bytes.
    pub async fn end(&mut self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        if self.state.headers_sent() && !self.state.is_finished() && !self.socket.is_aborted() {
            self.transport.end(&data);
            if let Err(err) = self.transport.flush().await {
                return Err(self.transport_failed(err));
            }
            self.state.finish(&self.socket);
            return Ok(());
        }
        self.deliver(data, false, None).await
    }

    /// Writes a body chunk without ending the response. Returns false when
    /// the transport is applying backpressure.
    pub fn write(&mut self, chunk: &[u8]) -> Result<bool> {
        if self.socket.is_aborted() {
            return Err(ResponseError::aborted());
        }
        if self.state.is_finished() {
            return Err(ResponseError::State("write"));
        }

        let state = &mut self.state;
        let mut accepted = true;
        self.transport.cork(&mut |t| {
            state.commit_headers(t);
            accepted = t.write(chunk);
        });
        Ok(accepted)
    }

    /// Sets the status and sends its reason phrase as plain text.
    pub async fn send_status(&mut self, code: u16) -> Result<()> {
        self.status(code)?;
        let status = self.state.status();
        let text = match status.reason_phrase() {
            "" => code.to_string(),
            reason => reason.to_string(),
        };
        self.set("content-type", "text/plain; charset=utf-8")?;
        self.send(Body::Text(text)).await
    }

    pub async fn json<V: Serialize + ?Sized + Sync>(&mut self, value: &V) -> Result<()> {
        self.ensure_sendable("send json")?;
        let body = json::stringify(value, self.config.response.json_spaces, self.config.response.json_escape)?;
        if !self.state.headers().contains("content-type") {
            self.state.set_header("content-type", "application/json; charset=utf-8")?;
        }
        self.send(Body::Text(body)).await
    }

    /// JSON wrapped in a call to the callback named by the request's query
    /// string, or plain JSON when no usable callback was given.
    pub async fn jsonp<V: Serialize + ?Sized + Sync>(&mut self, value: &V) -> Result<()> {
        self.ensure_sendable("send jsonp")?;
        let mut body = json::stringify(value, self.config.response.json_spaces, self.config.response.json_escape)?;
        if !self.state.headers().contains("content-type") {
            self.state.set_header("content-type", "application/json; charset=utf-8")?;
        }

        let callback = self
            .request
            .query(&self.config.response.jsonp_callback_name)
            .map(json::sanitize_callback)
            .filter(|cb| !cb.is_empty());
        if let Some(callback) = callback {
            self.state.set_header("x-content-type-options", "nosniff")?;
            self.state.set_header("content-type", "text/javascript; charset=utf-8")?;
            body = json::wrap_jsonp(&callback, &body);
        }

        self.send(Body::Text(body)).await
    }

    /// Redirects with `302 Found`.
    pub async fn redirect(&mut self, url: &str) -> Result<()> {
        self.redirect_with(StatusCode::FOUND, url).await
    }

    pub async fn redirect_with(&mut self, status: StatusCode, url: &str) -> Result<()> {
        self.ensure_sendable("redirect")?;
        self.location(url)?;
        let address = self.state.header("location").unwrap_or_default().to_string();

        let html = self.request.accepts(&["text/plain", "text/html"]) == Some("text/html");
        let (content_type, body) = if html {
            let escaped = escape_html(&address);
            (
                "text/html; charset=utf-8",
                format!("<p>{}. Redirecting to <a href=\"{escaped}\">{escaped}</a></p>", status.reason_phrase()),
            )
        } else {
            (
                "text/plain; charset=utf-8",
                format!("{}. Redirecting to {address}", status.reason_phrase()),
            )
        };

        self.state.set_status(status)?;
        self.state.set_header("content-type", content_type)?;
        tracing::debug!(status = status.as_u16(), location = %address, "redirecting");
        self.deliver(Bytes::from(body), false, None).await
    }

    /// Sends the body produced by the handler matching the request's
    /// `Accept` header, or `406 Not Acceptable` when nothing matches.
    pub async fn format(&mut self, format: Format) -> Result<()> {
        self.ensure_sendable("format")?;
        self.vary("Accept")?;

        let types = format.types();
        let accept = self.request.header("accept").map(str::to_string);
        match format.select(accept.as_deref()) {
            Some((ty, handler)) => {
                if let Some(ty) = ty {
                    self.state.set_header("content-type", mime::with_charset(&ty))?;
                }
                let body = handler();
                self.send(body).await
            }
            None => {
                let err = ResponseError::NotAcceptable { types };
                tracing::debug!(error = %err, "no acceptable representation");
                self.state.set_status(StatusCode::NOT_ACCEPTABLE)?;
                self.state.set_header("content-type", "text/html; charset=utf-8")?;
                let page = error_page(StatusCode::NOT_ACCEPTABLE, &err.to_string());
                self.deliver(Bytes::from(page), false, None).await
            }
        }
    }

    /// Streams `source` as a body of exactly `total_size` bytes.
    pub async fn stream<S: BodySource>(&mut self, mut source: S, total_size: u64) -> Result<()> {
        if let Err(err) = self.ensure_sendable("stream") {
            source.destroy(Some(&err));
            return Err(err);
        }
        self.pipe(&mut source, total_size).await
    }

    /// Marks the response finished. Only the first call closes the socket.
    pub fn finish(&mut self) -> bool {
        self.state.finish(&self.socket)
    }

    pub(crate) async fn pipe<S>(&mut self, source: &mut S, total_size: u64) -> Result<()>
    where
        S: BodySource + ?Sized,
    {
        if self.state.status().is_bodyless() || self.request.method == Method::HEAD {
            return self.pipe_head_only(source, total_size).await;
        }
        TransportWriter::new(&mut self.transport, &mut self.state, &self.socket, total_size)
            .pipe(source)
            .await
    }

    /// HEAD and bodyless statuses: commit the head, end without pulling a
    /// single chunk from `source`.
    async fn pipe_head_only<S>(&mut self, source: &mut S, total_size: u64) -> Result<()>
    where
        S: BodySource + ?Sized,
    {
        let status = self.state.status();
        let reported = if status.is_bodyless() {
            for name in ["content-type", "content-length", "transfer-encoding"] {
                self.state.remove_header(name)?;
            }
            None
        } else {
            Some(total_size)
        };

        let state = &mut self.state;
        self.transport.cork(&mut |t| {
            state.commit_headers(t);
            t.end_without_body(reported);
        });

        if let Err(err) = self.transport.flush().await {
            let err = self.transport_failed(err);
            source.destroy(Some(&err));
            return Err(err);
        }
        source.destroy(None);
        self.state.finish(&self.socket);
        Ok(())
    }

    /// The simple, non-streaming path: commit and hand over the whole body
    /// in one corked scope, then finish.
    ///
    /// `conditional` enables the not-modified short-circuit. `head_length`
    /// is the length reported to HEAD requests when it differs from `body`.
    pub(crate) async fn deliver(&mut self, mut body: Bytes, conditional: bool, head_length: Option<u64>) -> Result<()> {
        self.ensure_sendable("send")?;

        let status = self.state.status();
        let not_modified = conditional && self.request.is_fresh(status, self.state.headers());
        if status.is_bodyless() {
            for name in ["content-type", "content-length", "transfer-encoding"] {
                self.state.remove_header(name)?;
            }
            body = Bytes::new();
        }
        let head_only = self.request.method == Method::HEAD;
        let reported = head_length.unwrap_or(body.len() as u64);

        let state = &mut self.state;
        self.transport.cork(&mut |t| {
            if not_modified {
                state.commit_not_modified(t);
                t.end_without_body(None);
                return;
            }
            state.commit_headers(t);
            if status.is_bodyless() {
                t.end_without_body(None);
            } else if head_only {
                t.end_without_body(Some(reported));
            } else {
                t.end(&body);
            }
        });

        if let Err(err) = self.transport.flush().await {
            return Err(self.transport_failed(err));
        }
        self.state.finish(&self.socket);
        Ok(())
    }

    pub(crate) fn ensure_sendable(&self, action: &'static str) -> Result<()> {
        if self.socket.is_aborted() {
            return Err(ResponseError::aborted());
        }
        if self.state.headers_sent() {
            return Err(ResponseError::State(action));
        }
        Ok(())
    }

    fn transport_failed(&mut self, err: TransportError) -> ResponseError {
        if err.is_disconnect() {
            self.socket.abort();
            return ResponseError::aborted();
        }
        let err = ResponseError::from(err);
        tracing::warn!(error = %err, "response transport failed");
        if !self.state.is_finished() {
            self.transport.close();
            self.socket.error(&err);
        }
        err
    }
}

/// `W/"<len>-<digest>"` over the body bytes.
fn weak_etag(body: &[u8]) -> String {
    let digest = STANDARD.encode(Sha256::digest(body));
    format!("W/\"{:x}-{}\"", body.len(), &digest[..27])
}

fn append_vary(header: &str, field: &str) -> String {
    let mut fields: Vec<String> = header
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if fields.iter().any(|f| f == "*") {
        return header.to_string();
    }

    for f in field.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if f == "*" {
            return "*".to_string();
        }
        if !fields.iter().any(|existing| existing.eq_ignore_ascii_case(f)) {
            fields.push(f.to_string());
        }
    }
    fields.join(", ")
}

pub(crate) fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
