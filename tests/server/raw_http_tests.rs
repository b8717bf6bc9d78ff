use crate::utils::{admin, raw_exchange, split_response, start_server};
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn response_is_written_byte_exact_test() {
    // Arrange
    let server = start_server().await;
    admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "path": "/exact" },
            "httpResponse": {
                "statusCode": 418,
                "headers": [
                    { "name": "X-Second", "value": "b" },
                    { "name": "X-A", "value": "1" },
                    { "name": "X-A", "value": "3" },
                    { "name": "X-First", "value": "a" }
                ],
                "body": "hello"
            }
        }),
    )
    .await;

    // Act
    let raw = raw_exchange(
        server.address(),
        b"GET /exact HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
    )
    .await;

    // Assert
    let (head, body) = split_response(&raw);
    assert_eq!(head[0], "HTTP/1.1 418 I'm a teapot");
    assert_eq!(
        head[1..5],
        ["x-second: b", "x-a: 1", "x-a: 3", "x-first: a"],
        "{:?}",
        head
    );
    for line in &head[5..] {
        assert!(
            line == "content-length: 5" || line == "connection: close",
            "unexpected header line {:?} in {:?}",
            line,
            head
        );
    }
    assert!(!head.iter().any(|l| l.starts_with("date:")), "{:?}", head);
    assert_eq!(content_length_lines(&head), vec!["content-length: 5"]);
    assert_eq!(body, b"hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn declared_content_length_is_written_once_test() {
    // Arrange
    let server = start_server().await;
    let (status, _) = admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "path": "/sized" },
            "httpResponse": {
                "headers": [ { "name": "Content-Length", "value": "5" } ],
                "body": "hello"
            }
        }),
    )
    .await;
    assert_eq!(status, 201);

    // Act
    let raw = raw_exchange(
        server.address(),
        b"GET /sized HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
    )
    .await;

    // Assert
    let (head, body) = split_response(&raw);
    assert_eq!(head[0], "HTTP/1.1 200 OK");
    assert_eq!(content_length_lines(&head), vec!["content-length: 5"]);
    assert_eq!(body, b"hello");
}

#[tokio::test(flavor = "multi_thread")]
async fn interleaved_header_names_are_rejected_test() {
    let server = start_server().await;

    let (status, body) = admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "path": "/interleaved" },
            "httpResponse": {
                "headers": [
                    { "name": "X-A", "value": "1" },
                    { "name": "X-B", "value": "2" },
                    { "name": "X-A", "value": "3" }
                ]
            }
        }),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["field"], "httpResponse.headers[2].name");
}

fn content_length_lines(head: &[String]) -> Vec<&str> {
    head.iter()
        .filter(|l| l.to_ascii_lowercase().starts_with("content-length:"))
        .map(|l| l.as_str())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn no_match_has_no_body_test() {
    let server = start_server().await;

    let raw = raw_exchange(
        server.address(),
        b"GET /nothing HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
    )
    .await;

    let (head, body) = split_response(&raw);
    assert_eq!(head[0], "HTTP/1.1 404 Not Found");
    assert!(head.iter().any(|l| l == "content-length: 0"), "{:?}", head);
    assert!(body.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_request_is_rejected_test() {
    let server = start_server().await;

    let raw = raw_exchange(
        server.address(),
        b"GET /x HTTP/1.1\r\nthis is not a header\r\n\r\n",
    )
    .await;

    let (head, _) = split_response(&raw);
    assert!(head[0].starts_with("HTTP/1.1 400"), "{:?}", head);
}

#[tokio::test(flavor = "multi_thread")]
async fn unconvertible_header_closes_connection_test() {
    let server = start_server().await;

    let mut request = b"GET /x HTTP/1.1\r\nhost: localhost\r\nx-binary: ".to_vec();
    request.extend_from_slice(&[0xfa, 0xfb]);
    request.extend_from_slice(b"\r\n\r\n");

    // No `connection: close` in the request: the server must close on its own.
    let raw = raw_exchange(server.address(), &request).await;

    let (head, _) = split_response(&raw);
    assert!(head[0].starts_with("HTTP/1.1 400"), "{:?}", head);
    assert!(head.iter().any(|l| l == "connection: close"), "{:?}", head);
}
