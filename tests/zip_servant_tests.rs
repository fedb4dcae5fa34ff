use std::io::{Cursor, Write};
use std::net::SocketAddr;

use portico::Server;
use serde_json::Value;
use zip::write::SimpleFileOptions;

mod common;
use common::http::{parse_response_parts, send_request};
use common::test_server::setup_may_runtime;

fn spa_archive() -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        writer.start_file("index.html", options).unwrap();
        writer.write_all(b"<h1>root</h1>").unwrap();
        writer.add_directory("admin", options).unwrap();
        writer.start_file("admin/index.html", options).unwrap();
        writer.write_all(b"<h1>admin spa</h1>").unwrap();
        writer.start_file("admin/app.js", options).unwrap();
        writer.write_all(b"console.log('app');").unwrap();
        writer.start_file("data/config.json", options).unwrap();
        writer.write_all(b"{\"ok\":true}").unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn start_zip_server() -> (Server, SocketAddr) {
    setup_may_runtime();
    let server = Server::new();
    server.zip("/static", &spa_archive()).unwrap();
    let port = server.start(0).unwrap();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    (server, addr)
}

#[test]
fn test_fragment_url_serves_spa_index() {
    let (server, addr) = start_zip_server();
    let resp = send_request(
        &addr,
        "GET /static/admin/#/users HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    let (status, content_type, body) = parse_response_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(content_type, "text/html");
    assert_eq!(body, "<h1>admin spa</h1>");
    server.stop().unwrap();
}

#[test]
fn test_traversal_out_of_archive_is_404() {
    let (server, addr) = start_zip_server();
    let resp = send_request(
        &addr,
        "GET /static/../../etc/passwd HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    let (status, content_type, body) = parse_response_parts(&resp);
    assert_eq!(status, 404);
    assert_eq!(content_type, "application/json");
    let v: Value = serde_json::from_str(&body).unwrap();
    assert!(v["reason"].is_string());
    server.stop().unwrap();
}

#[test]
fn test_exact_entry_and_root_index() {
    let (server, addr) = start_zip_server();

    let resp = send_request(
        &addr,
        "GET /static/admin/app.js HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    let (status, _, body) = parse_response_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(body, "console.log('app');");

    let resp = send_request(
        &addr,
        "GET /static HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    let (status, content_type, body) = parse_response_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(content_type, "text/html");
    assert_eq!(body, "<h1>root</h1>");
    server.stop().unwrap();
}

#[test]
fn test_implicit_directory_and_trailing_slash() {
    let (server, addr) = start_zip_server();
    for path in ["/static/admin", "/static/admin/"] {
        let resp = send_request(
            &addr,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        );
        let (status, _, body) = parse_response_parts(&resp);
        assert_eq!(status, 200, "{path}");
        assert_eq!(body, "<h1>admin spa</h1>", "{path}");
    }
    server.stop().unwrap();
}

#[test]
fn test_archive_entries_round_trip() {
    let (server, addr) = start_zip_server();
    let entries = [
        ("/static/index.html", "<h1>root</h1>"),
        ("/static/admin/index.html", "<h1>admin spa</h1>"),
        ("/static/admin/app.js", "console.log('app');"),
        ("/static/data/config.json", "{\"ok\":true}"),
    ];
    for (path, expected) in entries {
        let resp = send_request(
            &addr,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        );
        let (status, _, body) = parse_response_parts(&resp);
        assert_eq!(status, 200, "{path}");
        assert_eq!(body, expected, "{path}");
    }
    server.stop().unwrap();
}

#[test]
fn test_malformed_archive_rejected_at_registration() {
    setup_may_runtime();
    let server = Server::new();
    assert!(server.zip("/static", b"definitely not a zip").is_err());
}
