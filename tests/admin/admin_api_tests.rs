use crate::utils::{admin, admin_at, client, start_server, start_with};
use expecto::ServerBuilder;
use serde_json::{json, Value};

#[tokio::test(flavor = "multi_thread")]
async fn most_recent_expectation_wins_test() {
    // Arrange
    let server = start_server().await;
    for body in ["first", "second"] {
        let (status, _) = admin(
            &server,
            "/mockserver/expectation",
            json!({ "httpRequest": { "path": "/a" }, "httpResponse": { "body": body } }),
        )
        .await;
        assert_eq!(status, 201);
    }

    // Act
    let response = client().get(server.url("/a")).send().await.unwrap();

    // Assert
    assert_eq!(response.text().await.unwrap(), "second");
}

#[tokio::test(flavor = "multi_thread")]
async fn priority_beats_recency_test() {
    let server = start_server().await;
    admin(
        &server,
        "/mockserver/expectation",
        json!([
            { "priority": 5, "httpRequest": { "path": "/a" }, "httpResponse": { "body": "important" } },
            { "httpRequest": { "path": "/a" }, "httpResponse": { "body": "recent" } }
        ]),
    )
    .await;

    let response = client().get(server.url("/a")).send().await.unwrap();

    assert_eq!(response.text().await.unwrap(), "important");
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_regex_is_rejected_with_field_test() {
    // Arrange
    let server = start_server().await;

    // Act
    let (status, body) = admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "path": { "regex": "/view/(" } },
            "httpResponse": { "body": "never" }
        }),
    )
    .await;

    // Assert
    assert_eq!(status, 400);
    assert_eq!(body["field"], "httpRequest.path");
    assert!(body["message"].as_str().unwrap().len() > 0);

    let (_, all) = admin(&server, "/mockserver/retrieve", Value::Null).await;
    assert_eq!(all, json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_payload_is_rejected_test() {
    let server = start_server().await;

    let response = client()
        .put(server.url("/mockserver/expectation"))
        .body("{ this is not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_admin_route_is_not_found_test() {
    let server = start_server().await;

    let (status, body) = admin(&server, "/mockserver/verify", Value::Null).await;
    assert_eq!(status, 404);
    assert!(body["message"].as_str().unwrap().contains("/mockserver/verify"));

    let response = client()
        .delete(server.url("/mockserver/expectation"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_removes_expectations_test() {
    // Arrange
    let server = start_server().await;
    admin(
        &server,
        "/mockserver/expectation",
        json!([
            { "id": "cart", "httpRequest": { "path": "/view/cart" }, "httpResponse": { "body": "cart" } },
            { "httpRequest": { "method": "POST", "path": "/order" }, "httpResponse": { "statusCode": 202 } },
            { "httpRequest": { "path": "/health" }, "httpResponse": {} }
        ]),
    )
    .await;

    // Act
    let (status, by_id) = admin(&server, "/mockserver/clear", json!({ "id": "cart" })).await;
    let (_, by_matcher) = admin(
        &server,
        "/mockserver/clear",
        json!({ "httpRequest": { "method": "POST" } }),
    )
    .await;

    // Assert
    assert_eq!(status, 200);
    assert_eq!(by_id["removed"], 1);
    assert_eq!(by_matcher["removed"], 1);

    let response = client().get(server.url("/view/cart")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let response = client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let (status, all) = admin(&server, "/mockserver/clear", Value::Null).await;
    assert_eq!(status, 200);
    assert_eq!(all["removed"], 1);

    let response = client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_and_retrieve_test() {
    let server = start_server().await;
    admin(
        &server,
        "/mockserver/expectation",
        json!([
            { "httpRequest": { "path": "/a" }, "httpResponse": {} },
            { "priority": 1, "httpRequest": { "path": "/b" }, "httpResponse": {} }
        ]),
    )
    .await;

    let (status, all) = admin(&server, "/mockserver/retrieve", Value::Null).await;
    assert_eq!(status, 200);
    assert_eq!(all[0]["httpRequest"]["path"], "/b");
    assert_eq!(all[1]["httpRequest"]["path"], "/a");

    let (_, filtered) = admin(
        &server,
        "/mockserver/retrieve",
        json!({ "httpRequest": { "path": "/a" } }),
    )
    .await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let (status, _) = admin(&server, "/mockserver/reset", Value::Null).await;
    assert_eq!(status, 200);
    let (_, all) = admin(&server, "/mockserver/retrieve", Value::Null).await;
    assert_eq!(all, json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn remaining_times_fall_through_test() {
    let server = start_server().await;
    admin(
        &server,
        "/mockserver/expectation",
        json!([
            { "httpRequest": { "path": "/a" }, "httpResponse": { "body": "fallback" } },
            {
                "httpRequest": { "path": "/a" },
                "httpResponse": { "body": "once" },
                "times": { "remainingTimes": 1 }
            }
        ]),
    )
    .await;

    let first = client().get(server.url("/a")).send().await.unwrap();
    let second = client().get(server.url("/a")).send().await.unwrap();

    assert_eq!(first.text().await.unwrap(), "once");
    assert_eq!(second.text().await.unwrap(), "fallback");
}

#[tokio::test(flavor = "multi_thread")]
async fn dedicated_admin_port_test() {
    // Arrange
    let server = start_with(ServerBuilder::new().admin_port(0)).await;
    let admin_addr = server.admin_address().unwrap();

    // Act
    let (status, _) = admin_at(
        admin_addr,
        "/mockserver/expectation",
        json!({ "httpRequest": { "path": "/a" }, "httpResponse": { "body": "a" } }),
    )
    .await;
    let (_, ports) = admin_at(admin_addr, "/mockserver/status", Value::Null).await;

    // Assert
    assert_eq!(status, 201);
    assert_eq!(
        ports["ports"],
        json!([server.address().port(), admin_addr.port()])
    );

    let on_admin_port = client()
        .get(format!("http://{}/a", admin_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(on_admin_port.status(), 404);

    let on_primary_port = client().get(server.url("/a")).send().await.unwrap();
    assert_eq!(on_primary_port.text().await.unwrap(), "a");
}
