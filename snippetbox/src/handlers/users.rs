//! Signup, login and logout

use super::{page, rerender};
use crate::error::AppResult;
use crate::extractors::RequestContext;
use crate::forms::{decode_post_form, UserLoginForm, UserSignupForm};
use crate::models::ModelError;
use crate::session::keys;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};

/// Where a login without a remembered path lands
pub const DEFAULT_AFTER_LOGIN: &str = "/snippet/create";

/// Empty signup form
pub async fn signup(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let data = ctx.template_data().with_form(&UserSignupForm::default());
    page(&state, "signup.html", &data)
}

/// Register a user
pub async fn signup_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<Response> {
    let mut form: UserSignupForm = decode_post_form(&body)?;
    form.validate();
    if !form.validator.valid() {
        return rerender(&state, &ctx, "signup.html", &form);
    }

    match state.users.insert(&form.name, &form.email, &form.password).await {
        Ok(()) => {}
        Err(ModelError::DuplicateEmail) => {
            form.validator
                .add_field_error("email", "Email address already in use");
            return rerender(&state, &ctx, "signup.html", &form);
        }
        Err(err) => return Err(err.into()),
    }

    ctx.flash("Your signup was successful. Please log in.")?;
    Ok(Redirect::to("/user/login").into_response())
}

/// Empty login form
pub async fn login(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Response> {
    let data = ctx.template_data().with_form(&UserLoginForm::default());
    page(&state, "login.html", &data)
}

/// Log a user in
///
/// The session token is renewed before the user id is stored, so a token
/// known before login is worthless afterwards.
pub async fn login_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<Response> {
    let mut form: UserLoginForm = decode_post_form(&body)?;
    form.validate();
    if !form.validator.valid() {
        return rerender(&state, &ctx, "login.html", &form);
    }

    let id = match state.users.authenticate(&form.email, &form.password).await {
        Ok(id) => id,
        Err(ModelError::InvalidCredentials) => {
            form.validator
                .add_non_field_error("Email or password is incorrect");
            return rerender(&state, &ctx, "login.html", &form);
        }
        Err(err) => return Err(err.into()),
    };

    ctx.session.renew_token().await?;
    ctx.session.put(keys::AUTHENTICATED_USER_ID, id)?;
    tracing::info!(user_id = id, "user logged in");

    let path = ctx.session.pop_string(keys::REDIRECT_PATH_AFTER_LOGIN);
    let target = if path.is_empty() {
        DEFAULT_AFTER_LOGIN
    } else {
        path.as_str()
    };
    Ok(Redirect::to(target).into_response())
}

/// Log the user out
pub async fn logout_post(ctx: RequestContext) -> AppResult<Response> {
    ctx.session.renew_token().await?;
    ctx.session.remove(keys::AUTHENTICATED_USER_ID);
    ctx.flash("You've been logged out successfully!")?;
    Ok(Redirect::to("/").into_response())
}
