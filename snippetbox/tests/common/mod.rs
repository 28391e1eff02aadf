//! Shared helpers for the HTTP tests
//!
//! [`TestApp`] drives the full router with an in-memory database and keeps
//! the session cookie between requests, like a browser would.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use snippetbox::{
    db,
    middleware::SessionConfig,
    password::{PasswordConfig, PasswordHasher},
    router, AppState,
};
use sqlx::SqlitePool;
use tower::ServiceExt;

/// Response with the body already read
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: header::HeaderName) -> &str {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    pub fn location(&self) -> &str {
        self.header(header::LOCATION)
    }

    /// Masked CSRF token from the first form on the page
    pub fn csrf_token(&self) -> String {
        let marker = r#"name="csrf_token" value=""#;
        let start = self.body.find(marker).expect("page has a csrf field") + marker.len();
        let end = self.body[start..].find('"').expect("csrf value is quoted");
        self.body[start..start + end].to_string()
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    cookie: Option<String>,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = db::connect_in_memory().await.expect("in-memory database");
        let hasher = PasswordHasher::new(PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        })
        .expect("valid params");
        let session_config = SessionConfig {
            secure: false,
            ..SessionConfig::default()
        };
        let state = AppState::sqlite(pool.clone(), hasher, session_config).expect("templates");
        let router = router(state, concat!(env!("CARGO_MANIFEST_DIR"), "/ui/static"));

        Self {
            router,
            pool,
            cookie: None,
        }
    }

    /// Forget the session cookie
    pub fn clear_cookies(&mut self) {
        self.cookie = None;
    }

    /// Session cookie currently held, `name=value`
    pub fn cookie(&self) -> Option<String> {
        self.cookie.clone()
    }

    /// Send `cookie` from now on, as a replayed or stolen cookie would be
    pub fn use_cookie(&mut self, cookie: Option<String>) {
        self.cookie = cookie;
    }

    /// Row count of `table`
    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .expect("countable table")
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Method::GET, path, None).await
    }

    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = serde_urlencoded::to_string(fields).expect("encodable form");
        self.send(Method::POST, path, Some(body)).await
    }

    /// Fetch `form_page` for a token, then post `fields` with it
    pub async fn submit(
        &mut self,
        form_page: &str,
        action: &str,
        fields: &[(&str, &str)],
    ) -> TestResponse {
        let token = self.get(form_page).await.csrf_token();
        let mut fields = fields.to_vec();
        fields.push(("csrf_token", &token));
        self.post_form(action, &fields).await
    }

    pub async fn signup(&mut self, name: &str, email: &str, password: &str) -> TestResponse {
        self.submit(
            "/user/signup",
            "/user/signup",
            &[("name", name), ("email", email), ("password", password)],
        )
        .await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.submit(
            "/user/login",
            "/user/login",
            &[("email", email), ("password", password)],
        )
        .await
    }

    /// Sign up and log in as a fresh user
    pub async fn logged_in(&mut self) {
        let signup = self.signup("Alice", "alice@example.com", "pa55word!").await;
        assert_eq!(signup.status, StatusCode::SEE_OTHER);
        let login = self.login("alice@example.com", "pa55word!").await;
        assert_eq!(login.status, StatusCode::SEE_OTHER);
    }

    async fn send(&mut self, method: Method, path: &str, body: Option<String>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body)),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self.router.clone().oneshot(request).await.expect("infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");

        if let Some(set_cookie) = headers.get(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().expect("ascii cookie");
            if set_cookie.contains("Max-Age=0") {
                self.cookie = None;
            } else {
                let pair = set_cookie.split(';').next().unwrap_or_default();
                self.cookie = Some(pair.to_string());
            }
        }

        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).expect("utf-8 body"),
        }
    }
}
