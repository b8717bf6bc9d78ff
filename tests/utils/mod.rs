use expecto::{ServerBuilder, ServerHandle};
use serde_json::Value;
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// Starts a server on a free port with the access log enabled.
pub async fn start_server() -> ServerHandle {
    start_with(ServerBuilder::new()).await
}

pub async fn start_with(builder: ServerBuilder) -> ServerHandle {
    init_logging();
    builder
        .print_access_log(true)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Sends `body` to an admin route and returns the status and the parsed JSON body.
pub async fn admin(server: &ServerHandle, path: &str, body: Value) -> (u16, Value) {
    admin_at(server.address(), path, body).await
}

pub async fn admin_at(addr: SocketAddr, path: &str, body: Value) -> (u16, Value) {
    let request = client().put(format!("http://{}{}", addr, path));
    let request = if body.is_null() {
        request
    } else {
        request
            .header("content-type", "application/json")
            .body(body.to_string())
    };

    let response = request.send().await.unwrap();
    let status = response.status().as_u16();
    let text = response.text().await.unwrap();
    let json = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap()
    };
    (status, json)
}

/// Writes `request` verbatim and reads until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

/// Splits a raw response into its head lines and body.
pub fn split_response(raw: &[u8]) -> (Vec<String>, Vec<u8>) {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8(raw[..end].to_vec()).unwrap();
    let lines = head.split("\r\n").map(|l| l.to_string()).collect();
    (lines, raw[end + 4..].to_vec())
}
