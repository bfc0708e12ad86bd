//! Bearer access tokens.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Numeric user id, as a string.
    sub: String,
    exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Issues and verifies HS256 tokens whose subject is the user id.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, lifetime_minutes: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: chrono::Duration::minutes(lifetime_minutes as i64),
        }
    }

    pub fn generate_secret() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    }

    pub fn issue(&self, user_id: i64) -> Result<String> {
        let exp = (chrono::Utc::now() + self.lifetime).timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key).context("Failed to sign token")
    }

    /// Returns the user id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<i64> {
        let data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|err| anyhow!("Invalid token: {}", err))?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| anyhow!("Token subject is not a user id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_user_id() {
        let issuer = TokenIssuer::new("secret", 60);
        let token = issuer.issue(42).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), 42);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenIssuer::new("secret-a", 60).issue(1).unwrap();
        assert!(TokenIssuer::new("secret-b", 60).verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = "secret";
        let claims = Claims {
            sub: "1".to_string(),
            exp: (chrono::Utc::now().timestamp() - 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert!(TokenIssuer::new(secret, 60).verify(&token).is_err());
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let secret = "secret";
        let claims = Claims {
            sub: "ada".to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert!(TokenIssuer::new(secret, 60).verify(&token).is_err());
    }

    #[test]
    fn generated_secrets_are_random() {
        let a = TokenIssuer::generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, TokenIssuer::generate_secret());
    }
}
