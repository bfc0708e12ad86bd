use super::auth;
use super::google::{GoogleAuthError, GoogleVerifier};
use super::token::{TokenIssuer, TokenResponse};
use crate::error::AppError;
use crate::library_store::{LibraryStore, NewUser, User};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

const INVALID_CREDENTIALS: &str = "Incorrect username or password";
const INVALID_TOKEN: &str = "Could not validate credentials";

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub name: Option<String>,
}

/// Account creation, password and Google sign-in, and token resolution.
pub struct UserManager {
    store: Arc<dyn LibraryStore>,
    tokens: TokenIssuer,
    google: Arc<dyn GoogleVerifier>,
}

impl UserManager {
    pub fn new(
        store: Arc<dyn LibraryStore>,
        tokens: TokenIssuer,
        google: Arc<dyn GoogleVerifier>,
    ) -> Self {
        Self {
            store,
            tokens,
            google,
        }
    }

    pub fn signup(&self, request: SignupRequest) -> Result<User, AppError> {
        let email = request.email.trim().to_lowercase();
        let username = request.username.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(AppError::validation("Invalid email address"));
        }
        if username.is_empty() {
            return Err(AppError::validation("Username must not be empty"));
        }
        if request.password.is_empty() {
            return Err(AppError::validation("Password must not be empty"));
        }

        if self.store.get_user_by_email(&email)?.is_some() {
            return Err(AppError::validation("Email already registered"));
        }
        if self.store.get_user_by_username(&username)?.is_some() {
            return Err(AppError::validation("Username already registered"));
        }

        let hashed_password = auth::hash_password(&request.password)?;
        let user_id = self.store.create_user(&NewUser {
            name: request.name,
            username,
            email,
            hashed_password: Some(hashed_password),
            profile_picture_url: None,
        })?;
        info!("Registered user {}", user_id);

        self.store
            .get_user(user_id)?
            .ok_or_else(|| AppError::Internal("Created user vanished".to_string()))
    }

    pub fn signin(&self, username: &str, password: &str) -> Result<TokenResponse, AppError> {
        let user = self
            .store
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        // Accounts created through Google have no password to check.
        let Some(hash) = user.hashed_password.as_deref() else {
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };
        if !user.is_active || !auth::verify(password.as_bytes(), hash)? {
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        Ok(TokenResponse::bearer(self.tokens.issue(user.id)?))
    }

    /// Signs in with a Google ID token, creating the account on first use.
    pub async fn google_signin(&self, credential: &str) -> Result<TokenResponse, AppError> {
        let profile = self.google.verify(credential).await.map_err(|err| match err {
            GoogleAuthError::NotConfigured => {
                AppError::ServiceUnavailable("Google sign-in is not configured".to_string())
            }
            GoogleAuthError::Discovery(message) => {
                warn!("Google discovery failed: {}", message);
                AppError::external("Could not reach Google", true)
            }
            other => {
                warn!("Rejected Google credential: {}", other);
                AppError::Unauthorized("Invalid Google token".to_string())
            }
        })?;

        let email = profile.email.to_lowercase();
        let user = match self.store.get_user_by_email(&email)? {
            Some(user) => user,
            None => {
                let username = self.unique_username(&email)?;
                let user_id = self.store.create_user(&NewUser {
                    name: profile.name,
                    username,
                    email,
                    hashed_password: None,
                    profile_picture_url: profile.picture,
                })?;
                info!("Registered user {} through Google", user_id);
                self.store
                    .get_user(user_id)?
                    .ok_or_else(|| AppError::Internal("Created user vanished".to_string()))?
            }
        };

        if !user.is_active {
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        Ok(TokenResponse::bearer(self.tokens.issue(user.id)?))
    }

    /// Resolves a bearer token to its active user.
    pub fn current_user(&self, token: &str) -> Result<User, AppError> {
        let user_id = self
            .tokens
            .verify(token)
            .map_err(|_| AppError::Unauthorized(INVALID_TOKEN.to_string()))?;
        match self.store.get_user(user_id)? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AppError::Unauthorized(INVALID_TOKEN.to_string())),
        }
    }

    fn unique_username(&self, email: &str) -> Result<String, AppError> {
        let base = email.split('@').next().unwrap_or(email).to_string();
        if self.store.get_user_by_username(&base)?.is_none() {
            return Ok(base);
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if self.store.get_user_by_username(&candidate)?.is_none() {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
