//! Panic recovery
//!
//! Outermost stage of every chain. A panic anywhere below is turned into a
//! logged 500 and the connection is marked for closing. The panic unwinds
//! through the security headers stage, so the headers are applied here again.

use super::security_headers;
use crate::error::status_page;
use axum::{
    extract::Request,
    http::{header::CONNECTION, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

/// Catch panics from inner stages and answer with 500
pub async fn recover_panic(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let trace = Backtrace::force_capture();
            tracing::error!(
                %method,
                %uri,
                panic = %panic_message(payload.as_ref()),
                trace = %trace,
                "recovered from panic"
            );

            let mut response = status_page(StatusCode::INTERNAL_SERVER_ERROR);
            security_headers::apply(&mut response);
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
