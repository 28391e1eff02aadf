//! HTTP request handlers
//!
//! - `health`: liveness probe
//! - `snippets`: home page, snippet view and creation
//! - `users`: signup, login and logout
//! - `account`: account page and password change
//!
//! Handlers behind the dynamic chain take a [`crate::extractors::RequestContext`]
//! and return [`crate::error::AppResult`]. Form handlers follow one cycle:
//! decode (400 on malformed input), validate, then either re-render the page
//! with the form at 422 or do the work and redirect with 303.

pub mod account;
pub mod health;
pub mod snippets;
pub mod users;

use crate::error::{status_page, AppResult};
use crate::extractors::RequestContext;
use crate::state::AppState;
use crate::templates::{render, TemplateData};
use axum::{http::StatusCode, response::Response};
use serde::Serialize;

/// Re-render `page` with a form that failed validation
fn rerender<F: Serialize>(
    state: &AppState,
    ctx: &RequestContext,
    page: &str,
    form: &F,
) -> AppResult<Response> {
    let data = ctx.template_data().with_form(form);
    render(state.templates.as_ref(), StatusCode::UNPROCESSABLE_ENTITY, page, &data)
}

/// Render `page` with 200
fn page(state: &AppState, page: &str, data: &TemplateData) -> AppResult<Response> {
    render(state.templates.as_ref(), StatusCode::OK, page, data)
}

/// Fallback for unmatched paths
pub async fn not_found() -> Response {
    status_page(StatusCode::NOT_FOUND)
}
