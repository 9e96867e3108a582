//! Turns execution outcomes and pipeline rejections into HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::api::{
    ExecutionOutcome, RunStatus, ERR_BODY, METHOD_NOT_ALLOWED_BODY, NOT_FOUND_BODY,
    NO_ACCESS_BODY, OK_BODY,
};
use crate::config::ResponseMode;
use crate::error::RequestError;

/// Captured command output, attached to responses for the request log.
#[derive(Debug, Clone)]
pub struct CapturedOutput(pub String);

pub fn outcome_response(outcome: ExecutionOutcome, mode: ResponseMode) -> Response {
    let success = outcome.is_success();
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let captured = match outcome.status {
        RunStatus::Completed { .. } if success => outcome.stdout,
        // Combined capture leaves stderr empty and everything in stdout.
        RunStatus::Completed { .. } if outcome.stderr.is_empty() => outcome.stdout,
        RunStatus::Completed { .. } => outcome.stderr,
        RunStatus::Failure { reason } => reason,
    };

    match mode {
        ResponseMode::Quiet => {
            let token = if success { OK_BODY } else { ERR_BODY };
            let mut response = (status, token).into_response();
            response.extensions_mut().insert(CapturedOutput(captured));
            response
        }
        ResponseMode::Verbose => {
            let mut response = (status, captured.clone()).into_response();
            response.extensions_mut().insert(CapturedOutput(captured));
            response
        }
    }
}

pub fn error_response(error: &RequestError, mode: ResponseMode) -> Response {
    match error {
        RequestError::MethodNotAllowed => {
            (StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_BODY).into_response()
        }
        RequestError::AccessDenied => (StatusCode::FORBIDDEN, NO_ACCESS_BODY).into_response(),
        RequestError::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response(),
        RequestError::RateLimited => StatusCode::TOO_MANY_REQUESTS.into_response(),
        RequestError::Validation(e) => match mode {
            ResponseMode::Quiet => (StatusCode::INTERNAL_SERVER_ERROR, ERR_BODY).into_response(),
            ResponseMode::Verbose => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        },
        RequestError::Fault(_) => (StatusCode::INTERNAL_SERVER_ERROR, ERR_BODY).into_response(),
    }
}
