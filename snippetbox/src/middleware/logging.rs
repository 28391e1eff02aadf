//! Request logging

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::Instrument;

/// Log every request and run the rest of the chain inside a request span
///
/// The client address is only known when the server was started with
/// connect info; it is logged as `-` otherwise.
pub async fn log_request(req: Request, next: Next) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "-".to_string(), |ConnectInfo(addr)| addr.ip().to_string());
    let proto = format!("{:?}", req.version());
    let method = req.method().clone();
    let uri = req.uri().clone();

    tracing::info!(%ip, %proto, %method, %uri, "received request");

    let span = tracing::info_span!("request", %method, %uri);
    next.run(req).instrument(span).await
}
