//! `Set-Cookie` serialization and cookie signing.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ResponseError, Result};
use crate::http::encoding::encode_component;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

/// Attributes for a cookie set through [`Response::cookie`].
///
/// [`Response::cookie`]: crate::http::response::Response::cookie
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    max_age: Option<Duration>,
    expires: Option<DateTime<Utc>>,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    http_only: bool,
    partitioned: bool,
    same_site: Option<SameSite>,
    priority: Option<Priority>,
    signed: bool,
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifetime relative to now. Also sets `Expires`.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Defaults to `/`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sign the value with the response's cookie secret.
    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }
}

/// Formats a timestamp as an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Encodes an arbitrary serializable value the way JSON cookies are stored.
pub fn json_value<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(format!("j:{}", serde_json::to_string(value)?))
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

fn is_attribute_value(s: &str) -> bool {
    s.bytes().all(|b| (0x20..0x7f).contains(&b) && b != b';')
}

/// Builds a `Set-Cookie` header value.
///
/// `secret` is required when the options ask for a signed cookie. `now` is
/// the reference time for `max_age`.
pub fn build(
    name: &str,
    value: &str,
    options: &CookieOptions,
    secret: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String> {
    if !is_token(name) {
        return Err(ResponseError::InvalidArgument(format!("cookie name is invalid: {name}")));
    }

    let value = if options.signed {
        let secret = secret.ok_or_else(|| {
            ResponseError::InvalidArgument("a cookie secret is required for signed cookies".to_string())
        })?;
        format!("s:{}", sign(value, secret))
    } else {
        value.to_string()
    };

    let mut out = format!("{name}={}", encode_component(&value));

    let mut expires = options.expires;
    if let Some(max_age) = options.max_age {
        let delta = chrono::Duration::from_std(max_age)
            .map_err(|_| ResponseError::InvalidArgument("cookie max-age is out of range".to_string()))?;
        expires = Some(now + delta);
        out.push_str(&format!("; Max-Age={}", max_age.as_secs()));
    }

    if let Some(domain) = &options.domain {
        if !is_attribute_value(domain) {
            return Err(ResponseError::InvalidArgument(format!("cookie domain is invalid: {domain}")));
        }
        out.push_str(&format!("; Domain={domain}"));
    }

    let path = options.path.as_deref().unwrap_or("/");
    if !is_attribute_value(path) {
        return Err(ResponseError::InvalidArgument(format!("cookie path is invalid: {path}")));
    }
    out.push_str(&format!("; Path={path}"));

    if let Some(expires) = expires {
        out.push_str(&format!("; Expires={}", http_date(expires)));
    }
    if options.http_only {
        out.push_str("; HttpOnly");
    }
    if options.secure {
        out.push_str("; Secure");
    }
    if options.partitioned {
        out.push_str("; Partitioned");
    }
    if let Some(priority) = options.priority {
        out.push_str(&format!("; Priority={}", priority.as_str()));
    }
    if let Some(same_site) = options.same_site {
        out.push_str(&format!("; SameSite={}", same_site.as_str()));
    }

    Ok(out)
}

/// Options that expire a cookie immediately, keeping its scope attributes.
pub fn clearing(options: &CookieOptions) -> CookieOptions {
    let mut cleared = options.clone();
    cleared.max_age = None;
    cleared.signed = false;
    cleared.expires = Utc.timestamp_opt(0, 0).single();
    cleared
}

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    }
}

/// Appends `.<base64 HMAC-SHA256>` to `value`.
pub fn sign(value: &str, secret: &str) -> String {
    let mut mac = keyed(secret);
    mac.update(value.as_bytes());
    format!("{value}.{}", STANDARD_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Returns the original value if `signed` carries a valid signature.
pub fn unsign(signed: &str, secret: &str) -> Option<String> {
    let (value, signature) = signed.rsplit_once('.')?;
    let signature = STANDARD_NO_PAD.decode(signature).ok()?;
    let mut mac = keyed(secret);
    mac.update(value.as_bytes());
    mac.verify_slice(&signature).ok()?;
    Some(value.to_string())
}
