use super::state::ServerState;
use crate::error::AppError;
use crate::library_store::User;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::debug;

/// The authenticated caller of a request.
#[derive(Debug)]
pub struct Session {
    pub user_id: i64,
    pub user: User,
}

impl Session {
    /// Rejects requests that name a user other than the caller.
    pub fn ensure_user(&self, claimed: Option<i64>) -> Result<(), AppError> {
        match claimed {
            Some(id) if id != self.user_id => Err(AppError::Forbidden(
                "Not allowed to act on behalf of another user".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

const NOT_AUTHENTICATED: &str = "Not authenticated";

async fn extract_session_token_from_cookies(parts: &mut Parts, ctx: &ServerState) -> Option<String> {
    let jar = CookieJar::from_request_parts(parts, ctx).await.ok()?;
    jar.get(COOKIE_SESSION_TOKEN_KEY)
        .map(Cookie::value)
        .map(|s| s.to_string())
}

fn extract_session_token_from_headers(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn extract_session_from_request_parts(
    parts: &mut Parts,
    ctx: &ServerState,
) -> Result<Session, AppError> {
    let token = match extract_session_token_from_headers(parts) {
        Some(token) => token,
        None => extract_session_token_from_cookies(parts, ctx)
            .await
            .ok_or_else(|| {
                debug!("No token in headers nor cookies.");
                AppError::Unauthorized(NOT_AUTHENTICATED.to_string())
            })?,
    };

    let user = ctx.user_manager.current_user(&token)?;
    debug!("Resolved session for user_id={}", user.id);
    Ok(Session {
        user_id: user.id,
        user,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, ctx: &ServerState) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx).await
    }
}

impl OptionalFromRequestParts<ServerState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(extract_session_from_request_parts(parts, ctx).await.ok())
    }
}
