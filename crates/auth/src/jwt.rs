//! HS256 token verification and issuance.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use agencyhub_core::{AgencyId, UserId};

use crate::claims::{validate_claims, JwtClaims, TokenValidationError};
use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("failed to encode token: {0}")]
    Encode(String),
}

/// Verifies bearer tokens and returns their claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// Shared-secret (HS256) validator.
///
/// Tokens are normally minted by the identity provider; `issue` exists for
/// tooling and tests that need a token signed with the same secret.
pub struct Hs256JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl Hs256JwtValidator {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issue(
        &self,
        sub: UserId,
        agency_id: AgencyId,
        roles: Vec<Role>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = JwtClaims {
            sub,
            agency_id,
            roles,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        // The time window is checked against the caller's clock below.
        validation.validate_exp = false;

        let data = decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates() {
        let v = Hs256JwtValidator::new(b"secret", "agencyhub");
        let now = Utc::now();
        let agency = AgencyId::new();
        let user = UserId::new();
        let token = v
            .issue(user, agency, vec![Role::ADMIN], Duration::minutes(5), now)
            .unwrap();

        let claims = v.validate(&token, now).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.agency_id, agency);
        assert_eq!(claims.roles, vec![Role::ADMIN]);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let a = Hs256JwtValidator::new(b"one", "agencyhub");
        let b = Hs256JwtValidator::new(b"two", "agencyhub");
        let now = Utc::now();
        let token = a
            .issue(UserId::new(), AgencyId::new(), vec![], Duration::minutes(5), now)
            .unwrap();
        assert!(matches!(b.validate(&token, now), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let a = Hs256JwtValidator::new(b"s", "someone-else");
        let b = Hs256JwtValidator::new(b"s", "agencyhub");
        let now = Utc::now();
        let token = a
            .issue(UserId::new(), AgencyId::new(), vec![], Duration::minutes(5), now)
            .unwrap();
        assert!(b.validate(&token, now).is_err());
    }

    #[test]
    fn expiry_uses_supplied_clock() {
        let v = Hs256JwtValidator::new(b"secret", "agencyhub");
        let now = Utc::now();
        let token = v
            .issue(UserId::new(), AgencyId::new(), vec![], Duration::minutes(5), now)
            .unwrap();
        let later = now + Duration::minutes(6);
        assert_eq!(
            v.validate(&token, later),
            Err(TokenError::Claims(TokenValidationError::Expired))
        );
    }
}
