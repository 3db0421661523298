//! Outbound HTTP client against a canned single-shot server.

use coserv::HttpClient;
use serde_json::json;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

/// Accept one connection, capture the request, send a fixed response.
fn one_shot_server(response: &'static str) -> (std::net::SocketAddr, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut captured = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            captured.extend_from_slice(&chunk[..n]);
            if n == 0 || request_complete(&captured) {
                break;
            }
        }
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&captured).into_owned()
    });
    (addr, handle)
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4) else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let body_len = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    buf.len() >= header_end + body_len
}

#[test]
fn post_sends_json_and_reads_response() {
    let (addr, server) = one_shot_server(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 11\r\n\r\n{\"ok\":true}",
    );
    let client = HttpClient::new();
    let response = client
        .post("127.0.0.1", addr.port(), "/echo", &json!({"msg": "hi"}))
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.body, "{\"ok\":true}");
    assert_eq!(response.json().unwrap(), json!({"ok": true}));

    let captured = server.join().unwrap();
    assert!(captured.starts_with("POST /echo HTTP/1.1\r\n"));
    assert!(captured.contains("Host: 127.0.0.1\r\n"));
    assert!(captured.contains("User-Agent: coserv\r\n"));
    assert!(captured.contains("Content-Type: application/json\r\n"));
    assert!(captured.ends_with("{\"msg\":\"hi\"}"));
}

#[test]
fn get_json_parses_body() {
    let (addr, _server) = one_shot_server(
        "HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\n[1,2,3]",
    );
    let client = HttpClient::new();
    let value = client
        .get_json("127.0.0.1", addr.port(), "/numbers", &json!(null))
        .unwrap();
    assert_eq!(value, json!([1, 2, 3]));
}

#[test]
fn close_delimited_body() {
    let (addr, _server) = one_shot_server("HTTP/1.1 200 OK\r\n\r\npartial stream body");
    let client = HttpClient::new();
    let response = client
        .get("127.0.0.1", addr.port(), "/", &json!(null))
        .unwrap();
    assert_eq!(response.body, "partial stream body");
}

#[test]
fn connect_failure_is_request_failed() {
    let client = HttpClient::new();
    // Bind-then-drop to find a port with nothing listening.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = client
        .get("127.0.0.1", port, "/", &json!(null))
        .unwrap_err();
    assert!(matches!(err, coserv::ServiceError::RequestFailed(_)));
}

#[test]
fn non_json_body_fails_json_accessor() {
    let (addr, _server) = one_shot_server(
        "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 9\r\n\r\nnot json!",
    );
    let client = HttpClient::new();
    let response = client
        .get("127.0.0.1", addr.port(), "/", &json!(null))
        .unwrap();
    assert_eq!(response.status, 500);
    assert!(response.json().is_err());
}
