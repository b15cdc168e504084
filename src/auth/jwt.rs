use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JWTConfig;
use crate::models::UserSummary;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

/// Claims carried by every token: the user identity and its expiry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub data: UserSummary,
    pub exp: i64,
    pub iat: i64,
}

/// A freshly minted token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies HMAC-signed tokens with the configured secret.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &JWTConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Any member of the HMAC family verifies against the same secret.
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        TokenIssuer {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            lifetime: Duration::seconds(config.exp),
            validation,
        }
    }

    /// Signs a token for `user` that expires `jwt.exp` seconds from now.
    pub fn issue(&self, user: &UserSummary) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = Claims {
            data: user.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verifies signature, algorithm family and expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(&JWTConfig {
            secret: secret.to_string(),
            exp: 3 * 60 * 60,
        })
    }

    fn guts() -> UserSummary {
        UserSummary {
            id: 1,
            name: "Guts".to_string(),
        }
    }

    #[test]
    fn test_issue_then_validate() {
        let issuer = issuer("secretkey");
        let issued = issuer.issue(&guts()).unwrap();
        let claims = issuer.validate(&issued.token).unwrap();
        assert_eq!(claims.data, guts());
        assert_eq!(claims.exp, issued.expires_at.timestamp());
        // Three hours ahead, give or take the test's own runtime.
        assert!((claims.exp - claims.iat - 10800).abs() <= 1);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issued = issuer("secretkey").issue(&guts()).unwrap();
        assert!(issuer("another").validate(&issued.token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let claims = Claims {
            data: guts(),
            exp: Utc::now().timestamp() - 60,
            iat: Utc::now().timestamp() - 120,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secretkey"),
        )
        .unwrap();
        assert!(issuer("secretkey").validate(&token).is_err());
    }

    #[test]
    fn test_other_hmac_algorithms_are_accepted() {
        let claims = Claims {
            data: guts(),
            exp: Utc::now().timestamp() + 60,
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"secretkey"),
        )
        .unwrap();
        assert!(issuer("secretkey").validate(&token).is_ok());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(issuer("secretkey").validate("").is_err());
        assert!(issuer("secretkey").validate("not.a.token").is_err());
    }
}
