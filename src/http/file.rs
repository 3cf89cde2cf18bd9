//! Serving files from disk.
//!
//! Two strategies, chosen per file by a [`ServePolicy`]:
//!
//! - **small file**: the whole file is read on the off-thread reader and sent
//!   in a single corked write.
//! - **streamed**: the file is read in chunks and piped through the
//!   backpressure-aware [`TransportWriter`](crate::http::writer::TransportWriter).
//!
//! Hosts without an off-thread reader always stream.

use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{ResponseError, Result};
use crate::http::cookie::http_date;
use crate::http::encoding::content_disposition;
use crate::http::mime;
use crate::http::response::{Response, basename};
use crate::http::source::FileSource;
use crate::http::status::{StatusCode, error_page};
use crate::http::transport::Transport;

/// How to treat path segments starting with a dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dotfiles {
    /// Behave as if the file did not exist.
    #[default]
    Ignore,
    Allow,
    /// Refuse with `403`.
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    SmallFile,
    Streamed,
}

/// Chooses how a file of a given size is served.
pub trait ServePolicy: Send + Sync {
    fn mode(&self, size: u64, offload_available: bool) -> ServeMode;
}

/// Reads files below `threshold` bytes whole, streams the rest.
#[derive(Debug, Clone, Copy)]
pub struct SmallFilePolicy {
    pub threshold: u64,
}

impl SmallFilePolicy {
    pub const DEFAULT_THRESHOLD: u64 = 64 * 1024;
}

impl Default for SmallFilePolicy {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

impl ServePolicy for SmallFilePolicy {
    fn mode(&self, size: u64, offload_available: bool) -> ServeMode {
        if offload_available && size < self.threshold {
            ServeMode::SmallFile
        } else {
            ServeMode::Streamed
        }
    }
}

/// What the pipeline learned about a file before sending it.
#[derive(Debug, Clone)]
pub struct FileServingContext {
    pub path: PathBuf,
    pub size: u64,
    pub is_directory: bool,
    pub mode: ServeMode,
}

impl FileServingContext {
    fn new(path: PathBuf, meta: &Metadata, policy: &dyn ServePolicy, offload_available: bool) -> Self {
        Self {
            path,
            size: meta.len(),
            is_directory: meta.is_dir(),
            mode: policy.mode(meta.len(), offload_available),
        }
    }
}

/// Per-call options for [`Response::send_file`]. Unset fields fall back to
/// the response's [`FileConfig`](crate::config::FileConfig).
#[derive(Debug, Clone, Default)]
pub struct SendFileOptions {
    root: Option<PathBuf>,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    max_age: Option<Duration>,
    last_modified: Option<bool>,
    etag: Option<bool>,
    dotfiles: Option<Dotfiles>,
}

impl SendFileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory relative paths are resolved against. Paths may not leave it.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn content_type(mut self, ty: impl Into<String>) -> Self {
        self.content_type = Some(ty.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn last_modified(mut self, enabled: bool) -> Self {
        self.last_modified = Some(enabled);
        self
    }

    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag = Some(enabled);
        self
    }

    pub fn dotfiles(mut self, dotfiles: Dotfiles) -> Self {
        self.dotfiles = Some(dotfiles);
        self
    }
}

/// Lexically resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Turns a requested path into the file to serve.
///
/// With a root, `path` is taken relative to it and any `..` segment is
/// refused. Without one, `path` must be absolute.
pub fn resolve_path(path: &str, root: Option<&Path>) -> Result<PathBuf> {
    if path.is_empty() {
        return Err(ResponseError::InvalidArgument("path must be a non-empty string".to_string()));
    }
    if path.contains('\0') {
        return Err(ResponseError::InvalidArgument("path must not contain null bytes".to_string()));
    }

    let requested = Path::new(path);
    let climbs = requested.components().any(|c| c == Component::ParentDir);

    match root {
        Some(root) => {
            let root = normalize(root);
            let joined = root.join(path.trim_start_matches('/'));
            if climbs {
                return Err(ResponseError::Forbidden(joined));
            }
            let resolved = normalize(&joined);
            if !resolved.starts_with(&root) {
                return Err(ResponseError::Forbidden(resolved));
            }
            Ok(resolved)
        }
        None => {
            if !requested.is_absolute() {
                return Err(ResponseError::InvalidArgument(
                    "path must be absolute or specify root".to_string(),
                ));
            }
            if climbs {
                return Err(ResponseError::Forbidden(requested.to_path_buf()));
            }
            Ok(normalize(requested))
        }
    }
}

fn check_dotfiles(path: &Path, root: Option<&Path>, policy: Dotfiles) -> Result<()> {
    if policy == Dotfiles::Allow {
        return Ok(());
    }

    let relative = root
        .map(normalize)
        .and_then(|root| path.strip_prefix(root).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf());
    let hidden = relative.components().any(|c| match c {
        Component::Normal(segment) => segment.to_string_lossy().starts_with('.'),
        _ => false,
    });
    if !hidden {
        return Ok(());
    }

    match policy {
        Dotfiles::Deny => Err(ResponseError::Forbidden(path.to_path_buf())),
        _ => Err(ResponseError::FileRead {
            path: path.to_path_buf(),
            message: "no such file or directory".to_string(),
            not_found: true,
        }),
    }
}

impl<T: Transport> Response<T> {
    /// Sends the file at `path`.
    ///
    /// Resolves and stats the path, sets the file headers, then either reads
    /// the whole file off-thread or streams it, per the response's
    /// [`ServePolicy`]. A directory answers `404`. Errors raised before the
    /// head is committed leave the response untouched so the caller can
    /// still answer it.
    pub async fn send_file(&mut self, path: &str, options: SendFileOptions) -> Result<()> {
        self.ensure_sendable("send file")?;

        let root = options.root.as_deref();
        let resolved = resolve_path(path, root)?;
        let dotfiles = options.dotfiles.unwrap_or(self.config.files.dotfiles);
        check_dotfiles(&resolved, root, dotfiles)?;

        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| ResponseError::file_read(&resolved, &e))?;
        if self.socket.is_aborted() {
            return Err(ResponseError::aborted());
        }

        let context = FileServingContext::new(resolved, &meta, self.policy.as_ref(), self.reader.is_some());
        tracing::debug!(
            path = %context.path.display(),
            size = context.size,
            mode = ?context.mode,
            "serving file"
        );

        if context.is_directory {
            self.state.set_status(StatusCode::NOT_FOUND)?;
            self.state.set_header("content-type", "text/html; charset=utf-8")?;
            let page = error_page(StatusCode::NOT_FOUND, &format!("Cannot GET {}", self.request.path));
            return self.deliver(Bytes::from(page), false, None).await;
        }

        self.apply_file_headers(&context, &meta, &options)?;

        if self.request.is_fresh(self.state.status(), self.state.headers())
            || self.request.method == crate::http::request::Method::HEAD
        {
            return self.deliver(Bytes::new(), true, Some(context.size)).await;
        }

        match (context.mode, self.reader.clone()) {
            (ServeMode::SmallFile, Some(reader)) => {
                let bytes = reader.read(&context.path).await?;
                if self.socket.is_aborted() {
                    return Err(ResponseError::aborted());
                }
                self.deliver(bytes, false, None).await
            }
            _ => {
                let mut source = FileSource::open(&context.path, self.config.files.stream_chunk_size)
                    .await
                    .map_err(|e| ResponseError::file_read(&context.path, &e))?;
                self.pipe(&mut source, context.size).await
            }
        }
    }

    /// Sends the file as an attachment named `filename`, or after the file
    /// itself. Relative paths without a root resolve against the working
    /// directory.
    pub async fn download(&mut self, path: &str, filename: Option<&str>, options: SendFileOptions) -> Result<()> {
        self.ensure_sendable("download")?;

        let name = filename.unwrap_or_else(|| basename(path)).to_string();
        self.state
            .set_header("content-disposition", content_disposition("attachment", Some(&name)))?;

        let full = if options.root.is_none() && !Path::new(path).is_absolute() {
            let cwd = std::env::current_dir().map_err(|e| ResponseError::file_read(path, &e))?;
            cwd.join(path).to_string_lossy().into_owned()
        } else {
            path.to_string()
        };
        self.send_file(&full, options).await
    }

    fn apply_file_headers(
        &mut self,
        context: &FileServingContext,
        meta: &Metadata,
        options: &SendFileOptions,
    ) -> Result<()> {
        for (name, value) in &options.headers {
            self.state.set_header(name, value.clone())?;
        }

        if let Some(ty) = &options.content_type {
            let ty = if ty.contains('/') {
                ty.clone()
            } else {
                mime::with_charset(&mime::normalize(ty))
            };
            self.state.set_header("content-type", ty)?;
        } else if !self.state.headers().contains("content-type") {
            self.state.set_header("content-type", mime::for_path(&context.path))?;
        }

        let files = &self.config.files;
        if !self.state.headers().contains("cache-control") {
            let max_age = options.max_age.unwrap_or(Duration::from_secs(files.max_age_secs));
            let value = format!("public, max-age={}", max_age.as_secs());
            self.state.set_header("cache-control", value)?;
        }

        let modified = meta.modified().ok().map(DateTime::<Utc>::from);
        let last_modified = options.last_modified.unwrap_or(files.last_modified);
        if last_modified && !self.state.headers().contains("last-modified") {
            if let Some(mtime) = modified {
                self.state.set_header("last-modified", http_date(mtime))?;
            }
        }

        let etag = options.etag.unwrap_or(files.etag);
        if etag && !self.state.headers().contains("etag") {
            let mtime = modified.map(|m| m.timestamp_millis()).unwrap_or_default();
            self.state
                .set_header("etag", format!("W/\"{:x}-{:x}\"", context.size, mtime))?;
        }

        Ok(())
    }
}
