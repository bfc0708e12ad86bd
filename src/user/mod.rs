pub mod auth;
mod google;
mod token;
mod user_manager;

pub use google::{GoogleAuthError, GoogleProfile, GoogleVerifier, OidcGoogleVerifier};
pub use token::{TokenIssuer, TokenResponse};
pub use user_manager::{SignupRequest, UserManager};

#[cfg(feature = "mock")]
pub use google::MockGoogleVerifier;
