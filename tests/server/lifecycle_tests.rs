use crate::utils::{admin, client, start_server, start_with};
use expecto::{ListenerState, ServerBuilder};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_listener_test() {
    // Arrange
    let mut server = start_server().await;
    let addr = server.address();
    assert_eq!(server.state(), ListenerState::Listening);

    // Act
    server.shutdown().await;

    // Assert
    assert_eq!(server.state(), ListenerState::Stopped);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn in_flight_request_completes_during_drain_test() {
    // Arrange
    let mut server = start_with(ServerBuilder::new().drain_timeout(Duration::from_secs(5))).await;
    admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "path": "/slow" },
            "httpResponse": { "body": "finally", "delay": 300 }
        }),
    )
    .await;

    let url = server.url("/slow");
    let request = tokio::spawn(async move { client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut states = server.state_changes();

    // Act
    server.shutdown().await;

    // Assert
    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "finally");
    assert_eq!(*states.borrow_and_update(), ListenerState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn draining_refuses_new_connections_test() {
    // Arrange
    let server = start_with(ServerBuilder::new().drain_timeout(Duration::from_secs(5))).await;
    admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "path": "/slow" },
            "httpResponse": { "body": "finally", "delay": 1000 }
        }),
    )
    .await;

    let addr = server.address();
    let url = server.url("/slow");
    let request = tokio::spawn(async move { client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut states = server.state_changes();
    let shutdown = tokio::spawn(async move {
        let mut server = server;
        server.shutdown().await;
        server
    });

    // Act
    tokio::time::timeout(
        Duration::from_secs(1),
        states.wait_for(|state| *state == ListenerState::Draining),
    )
    .await
    .unwrap()
    .unwrap();

    // Assert
    assert!(!request.is_finished());
    assert!(TcpStream::connect(addr).await.is_err());

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "finally");

    let server = shutdown.await.unwrap();
    assert_eq!(server.state(), ListenerState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_timeout_aborts_connections_test() {
    // Arrange
    let mut server =
        start_with(ServerBuilder::new().drain_timeout(Duration::from_millis(100))).await;
    admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "path": "/stuck" },
            "httpResponse": { "delay": 30000 }
        }),
    )
    .await;

    let url = server.url("/stuck");
    let request = tokio::spawn(async move { client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Act
    let started = Instant::now();
    server.shutdown().await;

    // Assert
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(server.state(), ListenerState::Stopped);
    assert!(request.await.unwrap().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_handle_stops_the_server_test() {
    let server = start_server().await;
    let addr = server.address();
    let mut states = server.state_changes();

    drop(server);

    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == ListenerState::Stopped),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}
