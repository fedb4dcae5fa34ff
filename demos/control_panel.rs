//! Minimal embedding demo: a local control API with a WebSocket ticker.
//!
//! Run with `cargo run --example control_panel`, then:
//!
//! ```text
//! curl http://127.0.0.1:8090/hello
//! curl http://127.0.0.1:8090/v/Alice
//! websocat ws://127.0.0.1:8090/events   # receives a tick every second
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use portico::{CorsConfig, Response, Server};
use serde_json::json;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = Server::new();
    server
        .get("/hello", |_req| {
            Response::json(200, &json!({ "message": "Hello, World!" }))
        })
        .unwrap()
        .get("/v/:name", |req| {
            Response::text(
                200,
                format!("Hello, {}", req.path_param("name").unwrap_or("stranger")),
            )
        })
        .unwrap()
        .post("/echo", |req| Response::text(200, req.body_utf8().to_string()))
        .unwrap()
        .middleware(CorsConfig::default().middleware());

    server.dump_routes();
    let port = server.start(8090).expect("start failed");
    println!("control panel listening on http://127.0.0.1:{port}");

    loop {
        std::thread::sleep(Duration::from_secs(1));
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        server.broadcast(&json!({ "tick": now }).to_string());
    }
}
