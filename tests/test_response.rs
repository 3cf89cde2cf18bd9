mod common;

use std::io;

use bytes::Bytes;
use common::StubTransport;
use outflow::error::ResponseError;
use outflow::http::request::{Method, Request, RequestBuilder};
use outflow::http::response::Response;
use outflow::http::socket::Lifecycle;
use outflow::http::state::Phase;

fn response(transport: StubTransport, request: Request) -> Response<StubTransport> {
    Response::new(transport, request).with_reader(None)
}

#[tokio::test]
async fn test_send_text_defaults() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    res.send("hello").await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(200));
    assert_eq!(log.header("content-type"), Some("text/html; charset=utf-8"));
    assert!(log.header("etag").unwrap().starts_with("W/\"5-"));
    assert_eq!(log.body_str(), "hello");
    assert!(log.ended);
    // head and body leave in one batch
    assert_eq!(log.corks, 1);
    assert_eq!(res.state().phase(), Phase::Finished);
    assert_eq!(res.socket().lifecycle(), Lifecycle::Closed);
}

#[tokio::test]
async fn test_send_bytes_is_octet_stream() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    res.send(Bytes::from_static(b"\x00\x01")).await.unwrap();

    assert_eq!(
        log.lock().unwrap().header("content-type"),
        Some("application/octet-stream")
    );
}

#[tokio::test]
async fn test_send_json_value() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    res.send(serde_json::json!({ "a": 1 })).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.header("content-type"), Some("application/json; charset=utf-8"));
    assert_eq!(log.body_str(), r#"{"a":1}"#);
}

#[tokio::test]
async fn test_second_send_fails() {
    let mut res = response(StubTransport::new(), Request::get("/"));

    res.send("one").await.unwrap();
    let err = res.send("two").await.unwrap_err();

    assert!(matches!(err, ResponseError::State(_)));
    assert!(matches!(res.set("x-late", "1"), Err(ResponseError::State(_))));
    assert!(matches!(res.status(500), Err(ResponseError::State(_))));
}

#[tokio::test]
async fn test_bodyless_status_strips_content() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    res.status(204).unwrap().set("content-type", "text/plain").unwrap();
    res.send("ignored").await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(204));
    assert_eq!(log.header("content-type"), None);
    assert!(log.body.is_empty());
    assert!(log.ended);
    assert_eq!(log.reported_length, None);
}

#[tokio::test]
async fn test_head_reports_length_only() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let request = RequestBuilder::new().method(Method::HEAD).target("/").build().unwrap();
    let mut res = response(transport, request);

    res.send("hello").await.unwrap();

    let log = log.lock().unwrap();
    assert!(log.body.is_empty());
    assert_eq!(log.reported_length, Some(5));
}

#[tokio::test]
async fn test_matching_etag_short_circuits_to_304() {
    let first = StubTransport::new();
    let first_log = first.log_handle();
    response(first, Request::get("/")).send("cached body").await.unwrap();
    let etag = first_log.lock().unwrap().header("etag").unwrap().to_string();

    let transport = StubTransport::new();
    let log = transport.log_handle();
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/")
        .header("If-None-Match", etag)
        .build()
        .unwrap();
    let mut res = response(transport, request);
    res.send("cached body").await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(304));
    assert!(log.headers.is_empty());
    assert!(log.body.is_empty());
    assert!(res.is_finished());
}

#[tokio::test]
async fn test_send_after_abort_writes_nothing() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    res.socket().abort();
    let err = res.send("late").await.unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(err.code(), "ERR_RESPONSE_ABORTED");
    assert_eq!(log.lock().unwrap().status, None);
}

#[tokio::test]
async fn test_broken_pipe_on_flush_aborts() {
    let transport = StubTransport::new().failing_flush(io::ErrorKind::BrokenPipe);
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    let err = res.send("x").await.unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(res.socket().lifecycle(), Lifecycle::Aborted);
    assert!(!log.lock().unwrap().closed);
}

#[tokio::test]
async fn test_local_flush_failure_closes_transport() {
    let transport = StubTransport::new().failing_flush(io::ErrorKind::PermissionDenied);
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    let err = res.send("x").await.unwrap_err();

    assert!(matches!(err, ResponseError::Transport(_)));
    assert!(log.lock().unwrap().closed);
    assert_eq!(res.socket().lifecycle(), Lifecycle::Errored);
}

#[tokio::test]
async fn test_write_then_end() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    assert!(res.write(b"ab").unwrap());
    assert_eq!(res.state().phase(), Phase::HeadersSent);
    res.end("cd").await.unwrap();

    assert_eq!(log.lock().unwrap().body_str(), "abcd");
    assert!(res.is_finished());
}

#[tokio::test]
async fn test_append_joins_values() {
    let mut res = response(StubTransport::new(), Request::get("/"));

    res.append("X-List", "a").unwrap().append("x-list", "b").unwrap();

    assert_eq!(res.get("x-list"), Some("a, b"));
}

#[tokio::test]
async fn test_send_status() {
    let transport = StubTransport::new();
    let log = transport.log_handle();
    let mut res = response(transport, Request::get("/"));

    res.send_status(404).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.status, Some(404));
    assert_eq!(log.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(log.body_str(), "Not Found");
}

#[test]
fn test_invalid_status_rejected() {
    let mut res = response(StubTransport::new(), Request::get("/"));
    assert!(matches!(res.status(1000), Err(ResponseError::InvalidArgument(_))));
    assert!(matches!(res.status(42), Err(ResponseError::InvalidArgument(_))));
}
