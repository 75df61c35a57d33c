//! HS256 token issue/verify on top of the pure claims model.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};
use crate::groups::AccessGroup;
use crate::principal::PrincipalId;
use crate::roles::StaffRole;

#[derive(Debug, Error)]
pub enum TokenCodecError {
    #[error("token encoding failed: {0}")]
    Encode(String),

    #[error("token decoding failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Wire-format claims as they appear inside the signed token.
///
/// `iat`/`exp` are Unix seconds per RFC 7519; the richer [`JwtClaims`] model
/// is reconstructed after decoding.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: Uuid,
    username: String,
    role: StaffRole,
    group: AccessGroup,
    iat: i64,
    exp: i64,
}

/// HS256 token service: symmetric-key issue and verify.
pub struct Hs256TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, claims: &JwtClaims) -> Result<String, TokenCodecError> {
        let wire = WireClaims {
            sub: *claims.sub.as_uuid(),
            username: claims.username.clone(),
            role: claims.role,
            group: claims.group,
            iat: claims.issued_at.timestamp(),
            exp: claims.expires_at.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &wire, &self.encoding)
            .map_err(|e| TokenCodecError::Encode(e.to_string()))
    }

    /// Verify the signature, then validate the claims window against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenCodecError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Window checking is done on the reconstructed claims below so that
        // error kinds stay uniform with the pure validator.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<WireClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenCodecError::Decode(e.to_string()))?;

        let wire = data.claims;
        let issued_at = timestamp(wire.iat)
            .ok_or_else(|| TokenCodecError::Decode("iat out of range".to_string()))?;
        let expires_at = timestamp(wire.exp)
            .ok_or_else(|| TokenCodecError::Decode("exp out of range".to_string()))?;

        let claims = JwtClaims {
            sub: PrincipalId::from_uuid(wire.sub),
            username: wire.username,
            role: wire.role,
            group: wire.group,
            issued_at,
            expires_at,
        };

        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: PrincipalId::new(),
            username: "admin".to_string(),
            role: StaffRole::Administrator,
            group: AccessGroup::Elevated,
            issued_at: now,
            expires_at: now + Duration::hours(8),
        }
    }

    #[test]
    fn issue_then_verify_round_trips_claims() {
        let svc = Hs256TokenService::new("test-secret");
        let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let claims = sample_claims(now);

        let token = svc.issue(&claims).unwrap();
        let decoded = svc.verify(&token, now + Duration::minutes(1)).unwrap();

        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.username, claims.username);
        assert_eq!(decoded.role, claims.role);
        assert_eq!(decoded.group, claims.group);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let issuer = Hs256TokenService::new("secret-a");
        let verifier = Hs256TokenService::new("secret-b");
        let now = Utc::now();

        let token = issuer.issue(&sample_claims(now)).unwrap();
        assert!(matches!(
            verifier.verify(&token, now),
            Err(TokenCodecError::Decode(_))
        ));
    }

    #[test]
    fn expired_token_fails_with_claims_error() {
        let svc = Hs256TokenService::new("test-secret");
        let now = Utc::now();

        let token = svc.issue(&sample_claims(now)).unwrap();
        let later = now + Duration::hours(9);
        assert!(matches!(
            svc.verify(&token, later),
            Err(TokenCodecError::Claims(TokenValidationError::Expired))
        ));
    }
}
