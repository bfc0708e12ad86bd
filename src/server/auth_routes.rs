//! Account creation, sign-in and the current user.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::library_store::User;
use crate::server::session::Session;
use crate::server::state::{GuardedUserManager, ServerState};
use crate::user::{SignupRequest, TokenResponse};

#[derive(Deserialize)]
pub struct SigninBody {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct GoogleBody {
    pub credential: String,
}

async fn signup(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<User>, AppError> {
    debug!("signup() called for username={}", body.username);
    Ok(Json(user_manager.signup(body)?))
}

async fn signin(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<SigninBody>,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("signin() called for username={}", body.username);
    Ok(Json(user_manager.signin(&body.username, &body.password)?))
}

async fn google(
    State(user_manager): State<GuardedUserManager>,
    Json(body): Json<GoogleBody>,
) -> Result<Json<TokenResponse>, AppError> {
    Ok(Json(user_manager.google_signin(&body.credential).await?))
}

async fn me(session: Session) -> Json<User> {
    Json(session.user)
}

pub fn auth_routes() -> Router<ServerState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/google", post(google))
        .route("/users/me", get(me))
}
