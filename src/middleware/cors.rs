use http::Method;

use super::Middleware;

/// CORS (Cross-Origin Resource Sharing) configuration.
///
/// The server sets no CORS headers on its own; install the interceptor
/// produced by [`CorsConfig::middleware`] to decorate every response,
/// OPTIONS pre-flights included.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
        }
    }
}

impl CorsConfig {
    pub fn new(
        allowed_origins: Vec<String>,
        allowed_headers: Vec<String>,
        allowed_methods: Vec<Method>,
    ) -> Self {
        Self {
            allowed_origins,
            allowed_headers,
            allowed_methods,
        }
    }

    /// An on-response interceptor that stamps the configured
    /// `Access-Control-Allow-*` headers onto every response.
    pub fn middleware(&self) -> Middleware {
        let origins = self.allowed_origins.join(", ");
        let headers = self.allowed_headers.join(", ");
        let methods = self
            .allowed_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Middleware::on_response(move |_req, mut resp| {
            resp.headers
                .insert("Access-Control-Allow-Origin".into(), origins.clone());
            resp.headers
                .insert("Access-Control-Allow-Headers".into(), headers.clone());
            resp.headers
                .insert("Access-Control-Allow-Methods".into(), methods.clone());
            resp
        })
    }
}
