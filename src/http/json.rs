//! JSON and JSONP body encoding.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

/// Serializes `value` with optional indentation, optionally escaping `<`, `>`
/// and `&` so the output is safe to inline in HTML.
pub fn stringify<T: Serialize + ?Sized>(
    value: &T,
    spaces: Option<usize>,
    escape: bool,
) -> Result<String, serde_json::Error> {
    let body = match spaces {
        Some(n) if n > 0 => {
            let indent = vec![b' '; n];
            let mut out = Vec::new();
            let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(&indent));
            value.serialize(&mut ser)?;
            String::from_utf8(out).map_err(<serde_json::Error as serde::ser::Error>::custom)?
        }
        _ => serde_json::to_string(value)?,
    };

    if escape {
        Ok(body
            .replace('<', "\\u003c")
            .replace('>', "\\u003e")
            .replace('&', "\\u0026"))
    } else {
        Ok(body)
    }
}

/// Strips a JSONP callback name down to `[A-Za-z0-9_$.\[\]]`.
///
/// # Example
///
/// ```
/// # use outflow::http::json::sanitize_callback;
/// assert_eq!(sanitize_callback("evil(); alert(1)//"), "evilalert1");
/// assert_eq!(sanitize_callback("jQuery.cb[0]"), "jQuery.cb[0]");
/// ```
pub fn sanitize_callback(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'))
        .collect()
}

/// Wraps a JSON body in a guarded call to `callback`.
///
/// U+2028 and U+2029 are valid in JSON but not in a JavaScript string
/// literal, so they are escaped.
pub fn wrap_jsonp(callback: &str, body: &str) -> String {
    let body = body.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029");
    format!("/**/ typeof {callback} === 'function' && {callback}({body});")
}
