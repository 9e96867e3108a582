//! This crate holds the request pipeline of an HTTP triggered command gateway.
//! The runnable server lives in the `rusty-trigger-server` crate of the same repository.
//!
//! This can be used as an ssh replacement for a fixed set of operations:
//! every URL path maps to one pre-approved shell command.
//!
//! ## Usage
//! Build a [`routes::RouteTable`] and a [`config::GatewayConfig`] and hand both to
//! [`service::router`].
//! * `GET /metrics` returns a fixed liveness gauge.
//! * `GET /<path>` runs the command mapped to `<path>`.
//! * `POST /<path>` does the same, with the body offered as `$body` or piped to stdin.
//!
//! ## Pipeline
//! Each request passes, in order:
//! 1. the method check (`405`),
//! 2. the address allowlist (`403`, body `NOACCESS`),
//! 3. the route lookup (`404`),
//! 4. the per-path rate limit (`429`, empty body),
//! 5. parameter substitution, if enabled (`500` on rejected values),
//! 6. execution in `bash -c` (`200` on exit code zero, `500` otherwise).
//!
//! Quiet mode answers `OK`/`ERR`, verbose mode answers with the captured output.
//!
//! ## Parameters
//! Query parameters named `$something` replace the literal token `$something`
//! in the command template. Values have to fully match the configured pattern,
//! which by default only allows letters, digits, space, `/` and `-`.
//! *Widening the pattern widens what callers can inject into your shell.*
//!
//! ## Security
//! There is no authentication besides the address allowlist and no TLS.
//! Make sure the server is only reachable from trusted hosts.

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod process;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod service;
pub mod substitute;
