mod common;

use std::sync::Arc;

use common::StubTransport;
use outflow::config::Config;
use outflow::http::negotiate::{Format, best_match};
use outflow::http::request::{Method, Request, RequestBuilder};
use outflow::http::response::{Body, Response};
use outflow::http::status::StatusCode;

fn get(target: &str, headers: &[(&str, &str)]) -> Request {
    headers
        .iter()
        .fold(RequestBuilder::new().method(Method::GET).target(target), |b, (k, v)| {
            b.header(k, *v)
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_json_spacing_and_escaping_from_config() {
    let mut cfg = Config::default();
    cfg.response.json_spaces = Some(2);
    cfg.response.json_escape = true;

    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::with_config(transport, Request::get("/"), Arc::new(cfg));
    res.json(&serde_json::json!({ "h": "<b>" })).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(log.body_str(), "{\n  \"h\": \"\\u003cb\\u003e\"\n}");
}

#[tokio::test]
async fn test_jsonp_wraps_callback() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, Request::get("/?callback=cb"));

    res.jsonp(&serde_json::json!({ "a": 1 })).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.header("content-type"), Some("text/javascript; charset=utf-8"));
    assert_eq!(log.header("x-content-type-options"), Some("nosniff"));
    assert_eq!(log.body_str(), r#"/**/ typeof cb === 'function' && cb({"a":1});"#);
}

#[tokio::test]
async fn test_jsonp_sanitizes_callback() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, Request::get("/?callback=alert(document.cookie)"));

    res.jsonp(&1).await.unwrap();

    assert_eq!(
        log.lock().unwrap().body_str(),
        "/**/ typeof alertdocument.cookie === 'function' && alertdocument.cookie(1);"
    );
}

#[tokio::test]
async fn test_jsonp_without_callback_is_json() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, Request::get("/"));

    res.jsonp(&[1, 2]).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(log.body_str(), "[1,2]");
}

#[tokio::test]
async fn test_redirect_plain_text() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, Request::get("/"));

    res.redirect("/new page").await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(302));
    assert_eq!(log.header("location"), Some("/new%20page"));
    assert_eq!(log.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(log.body_str(), "Found. Redirecting to /new%20page");
}

#[tokio::test]
async fn test_redirect_html_when_preferred() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, get("/", &[("accept", "text/html")]));

    res.redirect_with(StatusCode::MOVED_PERMANENTLY, "/x?a=1&b=2").await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(301));
    assert_eq!(
        log.body_str(),
        "<p>Moved Permanently. Redirecting to <a href=\"/x?a=1&amp;b=2\">/x?a=1&amp;b=2</a></p>"
    );
}

#[test]
fn test_location_back() {
    let mut res = Response::new(StubTransport::new(), get("/", &[("referer", "/previous")]));
    res.location("back").unwrap();
    assert_eq!(res.get("location"), Some("/previous"));

    let mut res = Response::new(StubTransport::new(), Request::get("/"));
    res.location("back").unwrap();
    assert_eq!(res.get("location"), Some("/"));
}

#[test]
fn test_vary_merges_fields() {
    let mut res = Response::new(StubTransport::new(), Request::get("/"));

    res.vary("Accept").unwrap().vary("accept").unwrap();
    assert_eq!(res.get("vary"), Some("Accept"));

    res.vary("Origin, User-Agent").unwrap();
    assert_eq!(res.get("vary"), Some("Accept, Origin, User-Agent"));

    res.vary("*").unwrap();
    assert_eq!(res.get("vary"), Some("*"));
}

#[test]
fn test_content_type_short_names() {
    let mut res = Response::new(StubTransport::new(), Request::get("/"));

    res.content_type("json").unwrap();
    assert_eq!(res.get("content-type"), Some("application/json; charset=utf-8"));

    res.content_type("image/png").unwrap();
    assert_eq!(res.get("content-type"), Some("image/png"));

    res.content_type("html").unwrap();
    assert_eq!(res.get("content-type"), Some("text/html; charset=utf-8"));
}

#[test]
fn test_links_and_attachment() {
    let mut res = Response::new(StubTransport::new(), Request::get("/"));

    res.links(&[("next", "/?page=2")]).unwrap();
    res.links(&[("last", "/?page=5")]).unwrap();
    assert_eq!(
        res.get("link"),
        Some("</?page=2>; rel=\"next\", </?page=5>; rel=\"last\"")
    );

    res.attachment(Some("assets/logo.png")).unwrap();
    assert_eq!(res.get("content-type"), Some("image/png"));
    assert_eq!(res.get("content-disposition"), Some("attachment; filename=\"logo.png\""));
}

fn formats() -> Format {
    Format::new()
        .on("html", || Body::from("<p>hi</p>"))
        .on("json", || Body::from(serde_json::json!({ "hi": true })))
}

#[tokio::test]
async fn test_format_picks_accepted_type() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, get("/", &[("accept", "application/json")]));

    res.format(formats()).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.header("vary"), Some("Accept"));
    assert_eq!(log.header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(log.body_str(), r#"{"hi":true}"#);
}

#[tokio::test]
async fn test_format_without_match_is_406() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, get("/", &[("accept", "image/png")]));

    res.format(formats()).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(406));
    assert!(log.body_str().contains("text/html, application/json"));
}

#[tokio::test]
async fn test_format_fallback() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = Response::new(transport, get("/", &[("accept", "image/png")]));

    res.format(formats().fallback(|| Body::from("plain"))).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(200));
    assert_eq!(log.body_str(), "plain");
}

#[test]
fn test_best_match_ordering() {
    assert_eq!(best_match(None, &["json", "html"]), Some("json"));
    assert_eq!(best_match(Some("text/*, application/json;q=0.5"), &["json", "html"]), Some("html"));
    assert_eq!(best_match(Some("*/*;q=0.1, text/html"), &["json", "html"]), Some("html"));
    assert_eq!(best_match(Some("application/json;q=0"), &["json"]), None);
}
