use outflow::http::headers::HeaderTable;
use outflow::http::request::{Method, Request, RequestBuilder};
use outflow::http::status::StatusCode;

fn request(method: Method, headers: &[(&str, &str)]) -> Request {
    let mut builder = RequestBuilder::new().method(method).target("/");
    for (k, v) in headers {
        builder = builder.header(k, *v);
    }
    builder.build().unwrap()
}

#[test]
fn test_request_header_retrieval() {
    let req = request(
        Method::GET,
        &[("Host", "example.com"), ("Content-Type", "application/json")],
    );

    assert_eq!(req.header("host"), Some("example.com"));
    assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_query_parsing() {
    let req = Request::get("/search?q=rust%20lang&page=2&q=second");

    assert_eq!(req.path, "/search");
    assert_eq!(req.query("q"), Some("rust lang"));
    assert_eq!(req.query("page"), Some("2"));
    assert_eq!(req.query("missing"), None);
}

#[test]
fn test_builder_requires_target_and_method() {
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
    assert!(RequestBuilder::new().target("/").build().is_err());
}

#[test]
fn test_request_keep_alive_http11_default() {
    let req = request(Method::GET, &[]);
    assert!(req.keep_alive());
}

#[test]
fn test_request_keep_alive_explicit_close() {
    let req = request(Method::GET, &[("Connection", "close")]);
    assert!(!req.keep_alive());
}

#[test]
fn test_request_keep_alive_http10() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .target("/")
        .version("HTTP/1.0")
        .build()
        .unwrap();
    assert!(!req.keep_alive());

    let req = RequestBuilder::new()
        .method(Method::GET)
        .target("/")
        .version("HTTP/1.0")
        .header("Connection", "Keep-Alive")
        .build()
        .unwrap();
    assert!(req.keep_alive());
}

#[test]
fn test_method_parsing() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("HEAD"), Some(Method::HEAD));
    assert_eq!(Method::from_str("PATCH"), Some(Method::PATCH));
    assert_eq!(Method::from_str("get"), None);
    assert_eq!(Method::from_str("BREW"), None);
}

#[test]
fn test_referrer_either_spelling() {
    assert_eq!(request(Method::GET, &[("Referer", "/a")]).referrer(), Some("/a"));
    assert_eq!(request(Method::GET, &[("Referrer", "/b")]).referrer(), Some("/b"));
    assert_eq!(request(Method::GET, &[]).referrer(), None);
}

fn cached(etag: &str, last_modified: &str) -> HeaderTable {
    let mut headers = HeaderTable::new();
    headers.set("etag", etag);
    headers.set("last-modified", last_modified);
    headers
}

#[test]
fn test_freshness_by_etag() {
    let response = cached("W/\"abc\"", "Mon, 01 Jan 2024 00:00:00 GMT");

    let req = request(Method::GET, &[("If-None-Match", "\"abc\"")]);
    assert!(req.is_fresh(StatusCode::OK, &response));

    let req = request(Method::GET, &[("If-None-Match", "\"other\", W/\"abc\"")]);
    assert!(req.is_fresh(StatusCode::OK, &response));

    let req = request(Method::GET, &[("If-None-Match", "\"other\"")]);
    assert!(!req.is_fresh(StatusCode::OK, &response));

    let req = request(Method::POST, &[("If-None-Match", "\"abc\"")]);
    assert!(!req.is_fresh(StatusCode::OK, &response));

    let req = request(Method::GET, &[("If-None-Match", "\"abc\"")]);
    assert!(!req.is_fresh(StatusCode::NOT_FOUND, &response));
}

#[test]
fn test_freshness_by_date() {
    let response = cached("W/\"abc\"", "Mon, 01 Jan 2024 00:00:00 GMT");

    let req = request(Method::GET, &[("If-Modified-Since", "Tue, 02 Jan 2024 00:00:00 GMT")]);
    assert!(req.is_fresh(StatusCode::OK, &response));

    let req = request(Method::GET, &[("If-Modified-Since", "Sun, 31 Dec 2023 00:00:00 GMT")]);
    assert!(!req.is_fresh(StatusCode::OK, &response));

    let req = request(
        Method::GET,
        &[("If-Modified-Since", "Tue, 02 Jan 2024 00:00:00 GMT"), ("Cache-Control", "no-cache")],
    );
    assert!(!req.is_fresh(StatusCode::OK, &response));
}

#[test]
fn test_accepts() {
    let req = request(Method::GET, &[("Accept", "text/html,application/xhtml+xml;q=0.9")]);
    assert_eq!(req.accepts(&["json", "html"]), Some("html"));
    assert_eq!(req.accepts(&["json"]), None);
}
