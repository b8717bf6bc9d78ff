use crate::utils::{admin, client, start_server};
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn getting_started_test() {
    // Arrange
    let server = start_server().await;

    let (status, created) = admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": {
                "method": "GET",
                "path": "/view/cart",
                "queryStringParameters": { "cartId": "055CA455-1DF7-45BB-8535-4F83E7266092" },
                "cookies": { "session": "4930456C-C718-476F-971F-CB8E047AB349" }
            },
            "httpResponse": { "body": "some_response_body" }
        }),
    )
    .await;

    assert_eq!(status, 201);
    assert!(created["id"].as_str().map_or(false, |id| !id.is_empty()));

    // Act
    let response = client()
        .get(server.url("/view/cart?cartId=055CA455-1DF7-45BB-8535-4F83E7266092"))
        .header("cookie", "session=4930456C-C718-476F-971F-CB8E047AB349")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "some_response_body");
}

#[tokio::test(flavor = "multi_thread")]
async fn unmatched_request_gets_empty_not_found_test() {
    // Arrange
    let server = start_server().await;
    admin(
        &server,
        "/mockserver/expectation",
        json!({
            "httpRequest": { "method": "GET", "path": "/view/cart" },
            "httpResponse": { "body": "some_response_body" }
        }),
    )
    .await;

    // Act
    let response = client()
        .get(server.url("/view/other"))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 404);
    assert_eq!(response.bytes().await.unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_store_answers_not_found_test() {
    let server = start_server().await;

    let response = client().post(server.url("/")).send().await.unwrap();

    assert_eq!(response.status(), 404);
    assert!(response.bytes().await.unwrap().is_empty());
}
