//! Account pages

use super::{page, rerender};
use crate::error::AppResult;
use crate::extractors::RequestContext;
use crate::forms::{decode_post_form, AccountPasswordUpdateForm};
use crate::middleware::auth::LOGIN_PATH;
use crate::models::ModelError;
use crate::state::AppState;
use crate::templates::TemplateData;
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};

/// Account details of the logged-in user
pub async fn account_view(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let user = match state.users.get(ctx.user_id()).await {
        Ok(user) => user,
        Err(ModelError::NoRecord) => return Ok(Redirect::to(LOGIN_PATH).into_response()),
        Err(err) => return Err(err.into()),
    };

    let data = TemplateData {
        user: Some(user),
        ..ctx.template_data()
    };
    page(&state, "account.html", &data)
}

/// Empty password change form
pub async fn password_update(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let data = ctx
        .template_data()
        .with_form(&AccountPasswordUpdateForm::default());
    page(&state, "password.html", &data)
}

/// Change the password
pub async fn password_update_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<Response> {
    let mut form: AccountPasswordUpdateForm = decode_post_form(&body)?;
    form.validate();
    if !form.validator.valid() {
        return rerender(&state, &ctx, "password.html", &form);
    }

    match state
        .users
        .password_update(ctx.user_id(), &form.current_password, &form.new_password)
        .await
    {
        Ok(()) => {}
        Err(ModelError::InvalidCredentials) => {
            form.validator
                .add_field_error("currentPassword", "Current password is incorrect");
            return rerender(&state, &ctx, "password.html", &form);
        }
        Err(err) => return Err(err.into()),
    }

    ctx.flash("Your password has been updated!")?;
    Ok(Redirect::to("/account/view").into_response())
}
