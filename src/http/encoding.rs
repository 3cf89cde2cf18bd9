//! Escaping helpers for header values and generated bodies.

use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters a URL may not carry verbatim. `%` is handled separately so
/// existing escapes survive.
const URL_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Everything `encodeURIComponent` escapes.
pub(crate) const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// RFC 5987 `attr-char` complement, for `filename*=` parameters.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Percent-encodes a URL for a `Location` header, leaving valid `%XX`
/// escapes untouched.
///
/// # Example
///
/// ```
/// # use outflow::http::encoding::encode_url;
/// assert_eq!(encode_url("/a b?q=%20"), "/a%20b?q=%20");
/// assert_eq!(encode_url("/100%"), "/100%25");
/// ```
pub fn encode_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;

    while let Some(pos) = rest.find('%') {
        out.extend(utf8_percent_encode(&rest[..pos], URL_UNSAFE));
        let tail = &rest[pos + 1..];
        let escaped = tail.len() >= 2 && tail.as_bytes()[..2].iter().all(u8::is_ascii_hexdigit);
        out.push_str(if escaped { "%" } else { "%25" });
        rest = tail;
    }
    out.extend(utf8_percent_encode(rest, URL_UNSAFE));
    out
}

pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Builds a `Content-Disposition` value.
///
/// Names that are not plain printable ASCII get an ASCII fallback plus an
/// RFC 5987 `filename*` parameter.
pub fn content_disposition(kind: &str, filename: Option<&str>) -> String {
    let Some(name) = filename else {
        return kind.to_string();
    };

    let plain = name.chars().all(|c| c.is_ascii() && !c.is_ascii_control());
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();
    let quoted = fallback.replace('\\', "\\\\").replace('"', "\\\"");

    if plain {
        format!("{kind}; filename=\"{quoted}\"")
    } else {
        format!(
            "{kind}; filename=\"{quoted}\"; filename*=UTF-8''{}",
            utf8_percent_encode(name, ATTR_CHAR)
        )
    }
}
