use crate::http::request::{Method, Request, RequestBuilder};

const MAX_HEADERS: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    Incomplete,
}

/// Parses one request head from `buf`.
///
/// Returns the request and the number of bytes it occupied, including any
/// body announced by `Content-Length`. The body itself is skipped.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let head_len = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Err(ParseError::Incomplete),
        Err(httparse::Error::HeaderName | httparse::Error::HeaderValue) => {
            return Err(ParseError::InvalidHeader);
        }
        Err(_) => return Err(ParseError::InvalidRequest),
    };

    let method = parsed.method.ok_or(ParseError::InvalidRequest)?;
    let method = Method::from_str(method).ok_or(ParseError::InvalidMethod)?;
    let target = parsed.path.ok_or(ParseError::InvalidRequest)?;
    let version = match parsed.version {
        Some(0) => "HTTP/1.0",
        _ => "HTTP/1.1",
    };

    let mut builder = RequestBuilder::new().method(method).target(target).version(version);
    let mut content_length = 0usize;
    for header in parsed.headers.iter() {
        let value = std::str::from_utf8(header.value)
            .map_err(|_| ParseError::InvalidHeader)?
            .trim();
        if header.name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().map_err(|_| ParseError::InvalidContentLength)?;
        }
        builder = builder.header(header.name, value);
    }

    let consumed = head_len + content_length;
    if buf.len() < consumed {
        return Err(ParseError::Incomplete);
    }

    let request = builder.build().map_err(|_| ParseError::InvalidRequest)?;
    Ok((request, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET /a?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/a");
        assert_eq!(parsed.query("x"), Some("1"));
        assert_eq!(parsed.header("Host"), Some("example.com"));
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn skips_announced_body() {
        let req = b"POST /u HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET";
        let (_, consumed) = parse_http_request(req).unwrap();
        assert_eq!(&req[consumed..], b"GET");
    }

    #[test]
    fn waits_for_whole_head() {
        assert_eq!(
            parse_http_request(b"GET / HTTP/1.1\r\nHost: x").unwrap_err(),
            ParseError::Incomplete
        );
    }

    #[test]
    fn rejects_unknown_method() {
        assert_eq!(
            parse_http_request(b"BREW / HTTP/1.1\r\n\r\n").unwrap_err(),
            ParseError::InvalidMethod
        );
    }
}
