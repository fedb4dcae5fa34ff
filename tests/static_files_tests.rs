use std::fs;
use std::net::SocketAddr;

use portico::{FileServant, Server};
use tempfile::TempDir;

mod common;
use common::http::{parse_response_parts, send_request};
use common::test_server::setup_may_runtime;

fn site() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(dir.path().join("notes.txt"), "plain notes").unwrap();
    fs::write(dir.path().join(".secret"), "hidden").unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs").join("index.html"), "<h1>docs</h1>").unwrap();
    fs::create_dir(dir.path().join("noindex")).unwrap();
    fs::write(dir.path().join("noindex").join("data.bin"), [0u8; 4]).unwrap();
    dir
}

#[test]
fn test_serves_file_with_detected_type() {
    let dir = site();
    let servant = FileServant::new(dir.path());
    let resp = servant.serve("notes.txt");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"plain notes");
    assert!(resp
        .headers
        .get("Content-Type")
        .is_some_and(|ct| ct.starts_with("text/plain")));
}

#[test]
fn test_directory_serves_index_html() {
    let dir = site();
    let servant = FileServant::new(dir.path());
    let resp = servant.serve("docs");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"<h1>docs</h1>");
    assert_eq!(servant.serve("").body, b"<h1>home</h1>");
}

#[test]
fn test_directory_without_index_is_403() {
    let dir = site();
    assert_eq!(FileServant::new(dir.path()).serve("noindex").status, 403);
}

#[test]
fn test_hidden_file_is_403() {
    let dir = site();
    assert_eq!(FileServant::new(dir.path()).serve(".secret").status, 403);
}

#[test]
fn test_missing_file_is_404() {
    let dir = site();
    assert_eq!(FileServant::new(dir.path()).serve("absent.txt").status, 404);
}

#[test]
fn test_traversal_is_neutralized() {
    let dir = site();
    let servant = FileServant::new(dir.path());
    for attempt in ["../secrets", "..%2Fsecrets", "a/../../b", "../../etc/passwd"] {
        let status = servant.serve(attempt).status;
        assert!(status == 403 || status == 404, "{attempt} -> {status}");
    }
}

#[test]
fn test_file_servant_end_to_end() {
    setup_may_runtime();
    let dir = site();
    let server = Server::new();
    server.file("/assets", dir.path()).unwrap();
    let port = server.start(0).unwrap();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let resp = send_request(
        &addr,
        "GET /assets/notes.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );
    let (status, _, body) = parse_response_parts(&resp);
    assert_eq!(status, 200);
    assert_eq!(body, "plain notes");

    // Servants answer GET only; the router keeps searching for POST and
    // ends in a routing miss.
    let resp = send_request(
        &addr,
        "POST /assets/notes.txt HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(parse_response_parts(&resp).0, 404);
    server.stop().unwrap();
}
