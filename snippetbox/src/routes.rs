//! Route table
//!
//! ```text
//! GET  /ping                       no chain
//! GET  /static/*                   standard
//! GET  /                           standard + dynamic
//! GET  /snippet/view/{id}          standard + dynamic
//! GET  /user/signup  (+ POST)      standard + dynamic
//! GET  /user/login   (+ POST)      standard + dynamic
//! GET  /snippet/create (+ POST)    standard + protected
//! GET  /account/view               standard + protected
//! GET  /account/password/update (+ POST)  standard + protected
//! POST /user/logout                standard + protected
//! ```

use crate::handlers::{account, health, not_found, snippets, users};
use crate::middleware::{wrap, Chain};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::services::ServeDir;

/// Build the application router
pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let dynamic = Router::new()
        .route("/", get(snippets::home))
        .route("/snippet/view/{id}", get(snippets::snippet_view))
        .route("/user/signup", get(users::signup).post(users::signup_post))
        .route("/user/login", get(users::login).post(users::login_post));

    let protected = Router::new()
        .route(
            "/snippet/create",
            get(snippets::snippet_create).post(snippets::snippet_create_post),
        )
        .route("/account/view", get(account::account_view))
        .route(
            "/account/password/update",
            get(account::password_update).post(account::password_update_post),
        )
        .route("/user/logout", post(users::logout_post));

    let app = Router::new()
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .merge(wrap(dynamic, Chain::Dynamic, &state))
        .merge(wrap(protected, Chain::Protected, &state))
        .fallback(not_found);

    wrap(app, Chain::Standard, &state)
        .route("/ping", get(health::ping))
        .with_state(state)
}
