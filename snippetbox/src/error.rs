//! Application error type
//!
//! Handlers and middleware return [`AppError`]; its [`IntoResponse`] impl turns
//! client errors into bare status pages and logs server errors with a
//! backtrace before answering with a generic 500. Server error logs are
//! emitted inside the request span, so they carry method and uri.

use crate::models::ModelError;
use crate::session::SessionError;
use crate::templates::RenderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::backtrace::Backtrace;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request; answered with the given 4xx status
    #[error("client error: {0}")]
    Client(StatusCode),

    /// Unknown resource
    #[error("not found")]
    NotFound,

    /// Storage collaborator failure
    #[error("storage error: {0}")]
    Model(#[from] ModelError),

    /// Session load, save or serialization failure
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Template lookup or execution failure
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

/// Plain-text page carrying only the canonical reason for `status`
#[must_use]
pub fn status_page(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    (status, reason.to_string()).into_response()
}

/// Log a server-side failure and answer with a generic 500
pub fn server_error(err: &dyn std::error::Error) -> Response {
    let trace = Backtrace::force_capture();
    tracing::error!(error = %err, trace = %trace, "server error");
    status_page(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Client(status) => status_page(status),
            Self::NotFound => status_page(StatusCode::NOT_FOUND),
            Self::Model(_) | Self::Session(_) | Self::Render(_) => server_error(&self),
        }
    }
}

/// Convenience alias for handler results
pub type AppResult<T> = Result<T, AppError>;
