//! The conductor: orchestrates one request end-to-end.
//!
//! Order of operations on a finalized context: Content-Length validation,
//! route resolution, the OPTIONS pre-flight answer, request-object
//! construction, on-request middleware (may short-circuit), handler or
//! servant invocation, and on-response middleware. Every response the
//! conductor produces (error answers and pre-flights included) flows
//! through the on-response chain, so an installed CORS interceptor
//! decorates all of them.

use std::collections::HashMap;
use std::time::Instant;

use http::Method;
use tracing::{debug, info, warn};

use super::lifecycle::ServerInner;
use crate::request::{Request, RequestContext};
use crate::response::Response;
use crate::router::RouteTarget;

// Interceptors and handlers may suspend the coroutine, so the chain and
// dispatcher are cloned out of their locks instead of holding a guard
// across a suspension point. Both are cheap clones of Arc'd contents.
fn finalize(shared: &ServerInner, req: &Request, resp: Response) -> Response {
    let chain = shared.middleware.read().unwrap().clone();
    chain.apply_response(req, resp)
}

/// Run one assembled request through the dispatch pipeline.
pub(crate) fn conduct(shared: &ServerInner, ctx: RequestContext) -> Response {
    let started = Instant::now();

    if let Some(declared) = ctx.declared_length {
        if declared != ctx.body.len() {
            warn!(
                declared,
                received = ctx.body.len(),
                path = %ctx.path,
                "content-length mismatch"
            );
            let req = Request::from_context(&ctx, HashMap::new(), String::new());
            return finalize(shared, &req, Response::bad_request("Incomplete request."));
        }
    }

    let resolution = {
        let tree = shared.tree.read().unwrap();
        match tree.resolve(&ctx.method, &ctx.path) {
            Ok(r) => r,
            Err(e) => {
                let req = Request::from_context(&ctx, HashMap::new(), String::new());
                return finalize(shared, &req, Response::bad_request(e.to_string()));
            }
        }
    };

    // OPTIONS is answered before a routing miss so the pre-flight works on
    // any path; CORS headers appear only via installed middleware.
    if ctx.method == Method::OPTIONS {
        let req = match &resolution {
            Some(r) => Request::from_context(&ctx, r.path_params.clone(), r.remaining.clone()),
            None => Request::from_context(&ctx, HashMap::new(), String::new()),
        };
        return finalize(shared, &req, Response::no_content());
    }

    let resolution = match resolution {
        Some(r) => r,
        None => {
            warn!(method = %ctx.method, path = %ctx.path, "no route matched");
            let req = Request::from_context(&ctx, HashMap::new(), String::new());
            return finalize(shared, &req, Response::not_found(&ctx.path));
        }
    };

    debug!(
        method = %ctx.method,
        path = %ctx.path,
        target = ?resolution.target,
        remaining = %resolution.remaining,
        "route resolved"
    );

    let req = Request::from_context(&ctx, resolution.path_params, resolution.remaining);

    let chain = shared.middleware.read().unwrap().clone();
    if let Some(resp) = chain.apply_request(&req) {
        debug!(status = resp.status, "on-request middleware short-circuited");
        return finalize(shared, &req, resp);
    }

    let resp = match resolution.target {
        RouteTarget::Handler(name) => {
            let dispatcher = shared.dispatcher.read().unwrap().clone();
            dispatcher
                .dispatch(&name, req.clone())
                .unwrap_or_else(|| Response::internal_error("handler not registered"))
        }
        RouteTarget::File(servant) => servant.serve(&req.remaining),
        RouteTarget::Zip(servant) => servant.serve(&req.remaining),
    };

    let resp = finalize(shared, &req, resp);
    info!(
        method = %req.method,
        path = %req.path,
        status = resp.status,
        latency_us = started.elapsed().as_micros() as u64,
        "request complete"
    );
    resp
}
