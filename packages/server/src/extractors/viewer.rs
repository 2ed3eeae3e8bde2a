use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};

use crate::error::AppError;
use crate::state::AppState;

/// Anonymous viewer fingerprint: the client network address.
///
/// With `server.trust_forwarded_headers` on, taken from the first
/// `X-Forwarded-For` entry, then `X-Real-IP`. Otherwise, and as a fallback,
/// the peer address of the connection. `None` when nothing is available.
pub struct ViewerFingerprint(pub Option<String>);

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn forwarded_address(parts: &Parts) -> Option<String> {
    if let Some(forwarded) = header_value(parts, "x-forwarded-for")
        && let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty())
    {
        return Some(first.to_string());
    }
    header_value(parts, "x-real-ip").map(str::to_string)
}

pub(crate) fn fingerprint_from_parts(parts: &Parts, trust_forwarded: bool) -> Option<String> {
    if trust_forwarded && let Some(addr) = forwarded_address(parts) {
        return Some(addr);
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

impl FromRequestParts<AppState> for ViewerFingerprint {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let trust = state.config.server.trust_forwarded_headers;
        Ok(ViewerFingerprint(fingerprint_from_parts(parts, trust)))
    }
}
