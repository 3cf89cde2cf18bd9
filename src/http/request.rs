use std::collections::HashMap;

use chrono::DateTime;

use crate::http::headers::HeaderTable;
use crate::http::negotiate;
use crate::http::status::StatusCode;

/// HTTP request methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use outflow::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }
}

/// The parts of a request a response needs to look at.
///
/// Header names are stored lower-cased. The body is never seen here: request
/// parsing belongs to whoever drives the connection.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

/// Builder for constructing Request objects.
#[derive(Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: HashMap<String, String>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Request target, optionally carrying a query string.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let target = self.target.ok_or("target missing")?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (target, HashMap::new()),
        };

        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            query,
        })
    }
}

/// First value wins for repeated keys.
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        out.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    out
}

impl Request {
    /// Shorthand for a GET of `target` with no headers.
    pub fn get(target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (target.to_string(), HashMap::new()),
        };
        Self {
            method: Method::GET,
            path,
            version: "HTTP/1.1".to_string(),
            headers: HashMap::new(),
            query,
        }
    }

    /// Retrieves a header value by name, case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|v| v.as_str())
    }

    /// The `Referer` (or `Referrer`) header.
    pub fn referrer(&self) -> Option<&str> {
        self.header("referer").or_else(|| self.header("referrer"))
    }

    /// The offered type the client prefers, per its `Accept` header.
    pub fn accepts<'a>(&self, offered: &[&'a str]) -> Option<&'a str> {
        negotiate::best_match(self.header("accept"), offered)
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 needs it asked for.
    pub fn keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version != "HTTP/1.0",
        }
    }

    /// Whether a cached copy the client holds is still good for a response
    /// with the given status and headers.
    pub fn is_fresh(&self, status: StatusCode, response: &HeaderTable) -> bool {
        if !matches!(self.method, Method::GET | Method::HEAD) {
            return false;
        }
        let code = status.as_u16();
        if !((200..300).contains(&code) || code == 304) {
            return false;
        }

        let none_match = self.header("if-none-match");
        let modified_since = self.header("if-modified-since");
        if none_match.is_none() && modified_since.is_none() {
            return false;
        }
        if self
            .header("cache-control")
            .is_some_and(|cc| cc.to_ascii_lowercase().contains("no-cache"))
        {
            return false;
        }

        if let Some(tags) = none_match {
            let tags = tags.trim();
            if tags != "*" {
                let Some(etag) = response.get("etag") else {
                    return false;
                };
                let current = strip_weak(etag);
                if !tags.split(',').any(|t| strip_weak(t.trim()) == current) {
                    return false;
                }
            }
        }

        if let Some(since) = modified_since {
            let last = response
                .get("last-modified")
                .and_then(|v| DateTime::parse_from_rfc2822(v).ok());
            let since = DateTime::parse_from_rfc2822(since).ok();
            match (last, since) {
                (Some(last), Some(since)) if last <= since => {}
                _ => return false,
            }
        }

        true
    }
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
