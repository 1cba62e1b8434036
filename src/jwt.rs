//! HS256 bearer tokens.
//!
//! A token is accepted only if its signature verifies with the configured
//! secret and its claims match this deployment:
//!
//! | claim | required value                  |
//! |-------|---------------------------------|
//! | `aud` | application name                |
//! | `sub` | `auth`                          |
//! | `jti` | configured `jwtID`              |
//! | `exp` | in the future                   |
//! | `user`| non-empty, becomes the principal|

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Environment;
use crate::error::{AppError, AppResult};

/// Subject every accepted token must carry.
pub const SUBJECT: &str = "auth";

/// Token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub user: String,
    pub sub: String,
    pub aud: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verify `token` and return its claims.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` for any invalid token. The reason is only
/// logged at debug level.
pub fn validate_token(token: &str, audience: &str, jwt_id: &str, secret: &str) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    validation.sub = Some(SUBJECT.to_string());
    validation.set_required_spec_claims(&["exp", "sub", "aud"]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized
        })?;

    if data.claims.jti != jwt_id {
        debug!("Rejected bearer token with foreign token id");
        return Err(AppError::Unauthorized);
    }

    if data.claims.user.is_empty() {
        debug!("Rejected bearer token without user");
        return Err(AppError::Unauthorized);
    }

    Ok(data.claims)
}

/// Issue a token for `user`.
///
/// Tokens live one day in development and five minutes in production.
pub fn issue_token(
    user: &str,
    audience: &str,
    secret: &str,
    jwt_id: &str,
    env: Environment,
) -> AppResult<String> {
    let lifetime = match env {
        Environment::Dev => Duration::days(1),
        Environment::Prod => Duration::minutes(5),
    };
    let now = Utc::now();

    let claims = Claims {
        user: user.to_string(),
        sub: SUBJECT.to_string(),
        aud: audience.to_string(),
        jti: jwt_id.to_string(),
        iat: now.timestamp(),
        exp: (now + lifetime).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const AUD: &str = "api_skeleton";
    const SECRET: &str = "test-secret";
    const JTI: &str = "jwt-id-1";

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims() -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            user: "alice".to_string(),
            sub: SUBJECT.to_string(),
            aud: AUD.to_string(),
            jti: JTI.to_string(),
            iat: now,
            exp: now + 300,
        }
    }

    #[test]
    fn test_valid_token() {
        let token = sign(&claims(), SECRET);
        let decoded = validate_token(&token, AUD, JTI, SECRET).unwrap();
        assert_eq!(decoded.user, "alice");
    }

    #[test]
    fn test_issue_then_validate() {
        let token = issue_token("bob", AUD, SECRET, JTI, Environment::Prod).unwrap();
        let decoded = validate_token(&token, AUD, JTI, SECRET).unwrap();
        assert_eq!(decoded.user, "bob");
        assert_eq!(decoded.exp - decoded.iat, 300);
    }

    #[test]
    fn test_dev_tokens_live_one_day() {
        let token = issue_token("bob", AUD, SECRET, JTI, Environment::Dev).unwrap();
        let decoded = validate_token(&token, AUD, JTI, SECRET).unwrap();
        assert_eq!(decoded.exp - decoded.iat, 86_400);
    }

    #[test]
    fn test_wrong_secret() {
        let token = sign(&claims(), "other-secret");
        assert!(matches!(
            validate_token(&token, AUD, JTI, SECRET),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_wrong_audience() {
        let token = sign(&claims(), SECRET);
        assert!(validate_token(&token, "other-app", JTI, SECRET).is_err());
    }

    #[test]
    fn test_wrong_subject() {
        let mut c = claims();
        c.sub = "refresh".to_string();
        assert!(validate_token(&sign(&c, SECRET), AUD, JTI, SECRET).is_err());
    }

    #[test]
    fn test_wrong_token_id() {
        let token = sign(&claims(), SECRET);
        assert!(validate_token(&token, AUD, "jwt-id-2", SECRET).is_err());
    }

    #[test]
    fn test_expired_token() {
        let mut c = claims();
        c.iat -= 7200;
        c.exp = Utc::now().timestamp() - 3600;
        assert!(validate_token(&sign(&c, SECRET), AUD, JTI, SECRET).is_err());
    }

    #[test]
    fn test_empty_user_rejected() {
        let mut c = claims();
        c.user = String::new();
        assert!(validate_token(&sign(&c, SECRET), AUD, JTI, SECRET).is_err());
    }

    #[test]
    fn test_garbage_token() {
        assert!(validate_token("not.a.jwt", AUD, JTI, SECRET).is_err());
    }
}
