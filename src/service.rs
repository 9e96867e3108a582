//! The axum router tying the pipeline together.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use percent_encoding::percent_decode_str;
use tower_http::catch_panic::CatchPanicLayer;

use crate::api::{BODY_PARAM, ERR_BODY, METRICS_BODY, METRICS_PATH};
use crate::config::{GatewayConfig, ResponseMode};
use crate::error::RequestError;
use crate::guard::AccessGuard;
use crate::process::Executor;
use crate::rate_limit::RateLimiter;
use crate::response::{error_response, outcome_response, CapturedOutput};
use crate::routes::RouteTable;
use crate::substitute::{substitute, Params};

/// Largest `POST` body read into memory.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Random id tying the log lines of one request together.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub u64);

/// Detail of an unexpected failure, attached to the response for the request log.
#[derive(Debug, Clone)]
pub struct Fault(pub String);

/// Shared, read-only state of the pipeline plus the rate counters.
#[derive(Debug)]
pub struct Gateway {
    routes: RouteTable,
    guard: AccessGuard,
    limiter: RateLimiter,
    executor: Executor,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(routes: RouteTable, config: GatewayConfig) -> Self {
        Self {
            guard: AccessGuard::new(&config.allowed_addresses, config.allowlist_enabled),
            limiter: RateLimiter::new(config.rate_limit, config.window),
            executor: Executor::new(&config),
            routes,
            config,
        }
    }

    /// Method check, allowlist, route lookup, rate limit, substitution, execution.
    async fn handle(&self, id: u64, request: Request) -> Result<Response, RequestError> {
        let (parts, body) = request.into_parts();
        let is_post = parts.method == Method::POST;
        if parts.method != Method::GET && !(is_post && self.config.accept_post) {
            return Err(RequestError::MethodNotAllowed);
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
            .ok_or_else(|| RequestError::Fault(String::from("peer address unavailable")))?;
        if !self.guard.check(peer) {
            return Err(RequestError::AccessDenied);
        }

        // Routes are keyed by the decoded path, `/a%20b` reaches `/a b`.
        let path = percent_decode_str(parts.uri.path())
            .decode_utf8()
            .map_err(|_| RequestError::NotFound)?;
        let template = self.routes.get(&path).ok_or(RequestError::NotFound)?;
        if !self.limiter.check(&path) {
            return Err(RequestError::RateLimited);
        }

        let mut params = match parts.uri.query() {
            Some(query) => Params::from_query(query)
                .map_err(|e| RequestError::Fault(format!("malformed query: {e}")))?,
            None => Params::default(),
        };
        let body = if is_post {
            let bytes = to_bytes(body, BODY_LIMIT)
                .await
                .map_err(|e| RequestError::Fault(format!("failed to read body: {e}")))?;
            Some(bytes)
        } else {
            None
        };
        let stdin = if self.config.pipe_body {
            body
        } else {
            if let Some(bytes) = body {
                params.push(BODY_PARAM, String::from_utf8_lossy(&bytes));
            }
            None
        };

        let command = substitute(template, &params, &self.config.substitution)?;
        log::debug!(id; "command: {command}");

        let outcome = self.executor.run(id, &command, stdin).await;
        Ok(outcome_response(outcome, self.config.response))
    }
}

/// Builds the complete application: `/metrics` plus every route in `routes`.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`, the
/// allowlist needs the peer address.
pub fn router(routes: RouteTable, config: GatewayConfig) -> Router {
    let mode = config.response;
    let gateway = Arc::new(Gateway::new(routes, config));
    let app = Router::new()
        .route(METRICS_PATH, get(metrics))
        .fallback(run_route)
        .with_state(gateway);
    logged(app, mode)
}

/// Wraps `app` in the request log and the panic boundary.
///
/// Panics inside `app` become `500 ERR` responses and the server keeps going.
pub fn logged(app: Router, mode: ResponseMode) -> Router {
    app.layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(mode, log_request))
}

async fn metrics() -> &'static str {
    METRICS_BODY
}

async fn run_route(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let id = request
        .extensions()
        .get::<RequestId>()
        .map_or_else(|| fastrand::u64(..), |RequestId(id)| *id);

    match gateway.handle(id, request).await {
        Ok(response) => response,
        Err(e) => {
            let mut response = error_response(&e, gateway.config.response);
            if let RequestError::Fault(detail) = e {
                response.extensions_mut().insert(Fault(detail));
            } else {
                log::debug!(id; "rejected: {e}");
            }
            response
        }
    }
}

async fn log_request(State(mode): State<ResponseMode>, mut request: Request, next: Next) -> Response {
    let id = fastrand::u64(..);
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| String::from("unknown"), |ConnectInfo(addr)| addr.to_string());
    request.extensions_mut().insert(RequestId(id));

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status().as_u16();
    let output = match mode {
        ResponseMode::Verbose => response.extensions().get::<CapturedOutput>().map(|o| o.0.as_str()),
        ResponseMode::Quiet => None,
    };
    match response.extensions().get::<Fault>() {
        Some(Fault(fault)) => log::error!(
            id,
            method:display = method,
            path = path.as_str(),
            remote = remote.as_str(),
            status,
            duration:debug = duration,
            fault = fault.as_str();
            "webreq"
        ),
        None => log::info!(
            id,
            method:display = method,
            path = path.as_str(),
            remote = remote.as_str(),
            status,
            duration:debug = duration,
            output:debug = output;
            "webreq"
        ),
    }
    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        String::from("unknown panic")
    };
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, ERR_BODY).into_response();
    response.extensions_mut().insert(Fault(detail));
    response
}
