#![allow(dead_code)]

pub mod test_server {
    use std::sync::Once;

    /// Ensures the coroutine runtime and tracing are configured only once
    /// per process.
    static INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw HTTP request string and return the full raw response.
    /// Reads headers fully, then honors Content-Length for the body.
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(2000)))
            .unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        read_response(&mut stream)
    }

    /// Read one full HTTP response (headers plus Content-Length body) from
    /// an already-connected stream.
    pub fn read_response(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        let header_end = loop {
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            match stream.read(&mut chunk) {
                Ok(0) => break raw.len(),
                Ok(n) => raw.extend_from_slice(&chunk[..n]),
                Err(_) => break raw.len(),
            }
        };
        let headers = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let content_length = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        while raw.len() < header_end + content_length {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => raw.extend_from_slice(&chunk[..n]),
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    /// Split a raw response into (status, content-type, body).
    pub fn parse_response_parts(resp: &str) -> (u16, String, String) {
        let mut parts = resp.splitn(2, "\r\n\r\n");
        let headers = parts.next().unwrap_or("");
        let body = parts.next().unwrap_or("").to_string();
        let mut status = 0;
        let mut content_type = String::new();
        for line in headers.lines() {
            if line.starts_with("HTTP/1.1") {
                status = line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("0")
                    .parse()
                    .unwrap_or(0);
            } else if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-type") {
                    content_type = value.trim().to_string();
                }
            }
        }
        (status, content_type, body)
    }

    /// The value of a response header, if present.
    pub fn response_header(resp: &str, name: &str) -> Option<String> {
        let headers = resp.split("\r\n\r\n").next()?;
        headers.lines().find_map(|line| {
            let (header, value) = line.split_once(':')?;
            if header.eq_ignore_ascii_case(name) {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
    }
}

pub mod poll {
    use std::time::{Duration, Instant};

    /// Poll `check` until it passes or two seconds elapse. Cross-coroutine
    /// effects (peer removal, registry updates) are asynchronous, so tests
    /// wait for them instead of asserting immediately.
    pub fn until(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }
}
