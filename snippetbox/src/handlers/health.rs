//! Liveness probe

/// Answer `OK`
///
/// Mounted outside every middleware chain, so it keeps answering even when
/// sessions or storage are unhealthy.
pub async fn ping() -> &'static str {
    "OK"
}
