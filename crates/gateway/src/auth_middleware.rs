use {
    async_trait::async_trait,
    axum::{
        body::Body,
        extract::State,
        http::{Request, header, request::Parts},
        middleware::Next,
        response::{IntoResponse, Response},
    },
    sha2::{Digest, Sha256},
    tracing::{debug, warn},
};

use crate::{api_response::ApiError, server::AppState};

/// Cookie carrying the admin token.
pub const ADMIN_COOKIE: &str = "ferrygram_admin";

/// Query parameter carrying the admin token.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Decides admin access for requests when no admin token is configured.
#[async_trait]
pub trait AdminAuthenticator: Send + Sync {
    async fn authorize(&self, parts: &Parts) -> bool;
}

/// Rejects everything. Used until an operator configures a token.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

#[async_trait]
impl AdminAuthenticator for DenyAll {
    async fn authorize(&self, _parts: &Parts) -> bool {
        false
    }
}

/// Middleware guarding `/api/admin`.
///
/// With a configured token the request must present it as a bearer header,
/// the [`ADMIN_COOKIE`] cookie, or the `?token=` query parameter. Without
/// one, the gateway's fallback [`AdminAuthenticator`] decides.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let authorized = match state.gateway.admin_token() {
        Some(expected) => {
            presented_token(&parts).is_some_and(|token| tokens_match(&token, expected))
        },
        None => {
            debug!("no admin token configured, asking fallback authenticator");
            state.gateway.fallback_auth().authorize(&parts).await
        },
    };

    if !authorized {
        warn!(method = %parts.method, path = %parts.uri.path(), "admin request rejected");
        return ApiError::unauthorized().into_response();
    }

    next.run(Request::from_parts(parts, body)).await
}

/// The token a request presents, in header, cookie, query order.
pub fn presented_token(parts: &Parts) -> Option<String> {
    if let Some(auth_header) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        && let Some(token) = auth_header.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    let cookie_header = parts
        .headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if let Some(token) = parse_cookie(cookie_header, ADMIN_COOKIE) {
        return Some(token.to_string());
    }

    parts
        .uri
        .query()
        .and_then(|q| parse_query(q, TOKEN_QUERY_PARAM))
}

/// Compare digests so the comparison time doesn't depend on where the
/// inputs first differ.
fn tokens_match(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// Parse a specific cookie value from a Cookie header string.
pub fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(name)
            && let Some(value) = value.strip_prefix('=')
        {
            return Some(value);
        }
    }
    None
}

fn parse_query(query: &str, name: &str) -> Option<String> {
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix(name)
            && let Some(value) = value.strip_prefix('=')
        {
            return urlencoding::decode(value).ok().map(|v| v.into_owned());
        }
    }
    None
}
