//! End-to-end tests over a real socket

use bytes::Bytes;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use turul_json_rpc_engine::{
    JsonRpcResult, ResultStream, handler_fn, parse_params, stream_handler_fn,
};

use crate::HttpJsonRpcServer;

async fn start_server() -> std::net::SocketAddr {
    let server = HttpJsonRpcServer::builder()
        .register(
            "echo",
            handler_fn(|_ctx, params| async move {
                let value: Value = parse_params(params.as_deref())?;
                JsonRpcResult::<Value>::Ok(value)
            }),
        )
        .register_stream(
            "count",
            stream_handler_fn(|_ctx, params| async move {
                let n: u32 = parse_params(params.as_deref())?;
                let stream = async_stream::stream! {
                    yield Bytes::from_static(b"[");
                    for i in 1..=n {
                        let sep = if i == 1 { "" } else { "," };
                        yield Bytes::from(format!("{sep}{i}"));
                    }
                    yield Bytes::from_static(b"]");
                };
                JsonRpcResult::<ResultStream>::Ok(ResultStream::from_stream(stream))
            }),
        )
        .build()
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

/// Sends one request with `Connection: close` and returns status line and decoded body.
async fn roundtrip(addr: std::net::SocketAddr, method: &str, body: &str) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} /rpc HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = String::from_utf8(raw[..split].to_vec()).unwrap();
    let rest = &raw[split + 4..];
    let status = head.lines().next().unwrap().to_string();

    let chunked = head
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked");
    let body = if chunked { dechunk(rest) } else { rest.to_vec() };
    (status, body)
}

fn dechunk(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let line_end = data.windows(2).position(|w| w == b"\r\n").unwrap();
        let size_text = std::str::from_utf8(&data[..line_end]).unwrap();
        let size = usize::from_str_radix(size_text.trim(), 16).unwrap();
        data = &data[line_end + 2..];
        if size == 0 {
            return out;
        }
        out.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

#[tokio::test]
async fn test_streamed_batch_over_tcp() {
    let addr = start_server().await;
    let (status, body) = roundtrip(
        addr,
        "POST",
        r#"[{"jsonrpc":"2.0","method":"count","params":3,"id":1},{"jsonrpc":"2.0","method":"missing","id":2}]"#,
    )
    .await;

    assert!(status.contains("200"), "unexpected status: {status}");
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value[0], json!({"jsonrpc": "2.0", "id": 1, "result": [1, 2, 3]}));
    assert_eq!(value[1]["error"]["code"], -32601);
}

#[tokio::test]
async fn test_unary_request_over_tcp() {
    let addr = start_server().await;
    let (status, body) = roundtrip(
        addr,
        "POST",
        r#"{"jsonrpc":"2.0","method":"echo","params":{"a":[1,2]},"id":"x"}"#,
    )
    .await;

    assert!(status.contains("200"));
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({"jsonrpc": "2.0", "id": "x", "result": {"a": [1, 2]}}));
}

#[tokio::test]
async fn test_invalid_params_over_tcp() {
    let addr = start_server().await;
    let (_, body) = roundtrip(
        addr,
        "POST",
        r#"{"jsonrpc":"2.0","method":"count","params":"three","id":5}"#,
    )
    .await;

    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["id"], 5);
    assert_eq!(value["error"]["code"], -32602);
}

#[tokio::test]
async fn test_get_rejected_over_tcp() {
    let addr = start_server().await;
    let (status, _) = roundtrip(addr, "GET", "").await;
    assert!(status.contains("405"));
}
