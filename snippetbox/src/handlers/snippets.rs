//! Snippet pages

use super::{page, rerender};
use crate::error::{AppError, AppResult};
use crate::extractors::RequestContext;
use crate::forms::{decode_post_form, SnippetCreateForm};
use crate::models::ModelError;
use crate::state::AppState;
use crate::templates::TemplateData;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};

/// Latest snippets
pub async fn home(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let snippets = state.snippets.latest().await?;
    let data = TemplateData {
        snippets,
        ..ctx.template_data()
    };
    page(&state, "home.html", &data)
}

/// One snippet
///
/// Ids that are not positive integers, and unknown or expired snippets, are
/// 404s.
pub async fn snippet_view(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = match id.parse::<i64>() {
        Ok(id) if id >= 1 => id,
        _ => return Err(AppError::NotFound),
    };

    let snippet = match state.snippets.get(id).await {
        Ok(snippet) => snippet,
        Err(ModelError::NoRecord) => return Err(AppError::NotFound),
        Err(err) => return Err(err.into()),
    };

    let data = TemplateData {
        snippet: Some(snippet),
        ..ctx.template_data()
    };
    page(&state, "view.html", &data)
}

/// Empty creation form
pub async fn snippet_create(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let data = ctx.template_data().with_form(&SnippetCreateForm::default());
    page(&state, "create.html", &data)
}

/// Create a snippet
pub async fn snippet_create_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<Response> {
    let mut form: SnippetCreateForm = decode_post_form(&body)?;
    form.validate();
    if !form.validator.valid() {
        return rerender(&state, &ctx, "create.html", &form);
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;
    tracing::info!(snippet_id = id, "snippet created");

    ctx.flash("Snippet created successfully!")?;
    Ok(Redirect::to(&format!("/snippet/view/{id}")).into_response())
}
