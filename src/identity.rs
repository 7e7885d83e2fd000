//! Bearer-token verification against the external identity provider.
//!
//! The provider issues HS256 JWTs; the subject claim is the user id every owned row is keyed on.

use crate::domain::models::Identity;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid token format")]
    Invalid,
    #[error("unsupported signing algorithm")]
    Algorithm,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("subject is not a user id")]
    Subject,
}

pub trait IdentityProvider: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    email: Option<String>,
}

pub struct JwtVerifier {
    secret: Vec<u8>,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, IdentityError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| IdentityError::Invalid)
    }
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, IdentityError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| IdentityError::Invalid)?;
    serde_json::from_slice(&bytes).map_err(|_| IdentityError::Invalid)
}

impl IdentityProvider for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = parts.as_slice() else {
            return Err(IdentityError::Invalid);
        };

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(IdentityError::Algorithm);
        }

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| IdentityError::Invalid)?;
        let mut mac = self.mac()?;
        mac.update(token[..token.len() - signature.len() - 1].as_bytes());
        mac.verify_slice(&sig_bytes)
            .map_err(|_| IdentityError::Signature)?;

        let claims: Claims = decode_json(payload)?;
        if Utc::now().timestamp() >= claims.exp {
            return Err(IdentityError::Expired);
        }
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| IdentityError::Subject)?;

        Ok(Identity {
            user_id,
            email: claims.email,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{sign, token_for, SECRET};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_token() {
        let user_id = Uuid::new_v4();
        let identity = JwtVerifier::new(SECRET).verify(&token_for(user_id)).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.email.as_deref(), Some("candidate@example.com"));
    }

    #[test]
    fn test_rejects_tampering_and_expiry() {
        let verifier = JwtVerifier::new(SECRET);
        let user_id = Uuid::new_v4();

        let forged = sign(b"another-secret", "HS256", json!({"sub": user_id.to_string(), "exp": Utc::now().timestamp() + 60}));
        assert!(matches!(verifier.verify(&forged), Err(IdentityError::Signature)));

        let expired = sign(SECRET, "HS256", json!({"sub": user_id.to_string(), "exp": Utc::now().timestamp() - 1}));
        assert!(matches!(verifier.verify(&expired), Err(IdentityError::Expired)));

        let none_alg = sign(SECRET, "none", json!({"sub": user_id.to_string(), "exp": Utc::now().timestamp() + 60}));
        assert!(matches!(verifier.verify(&none_alg), Err(IdentityError::Algorithm)));

        let bad_sub = sign(SECRET, "HS256", json!({"sub": "service_role", "exp": Utc::now().timestamp() + 60}));
        assert!(matches!(verifier.verify(&bad_sub), Err(IdentityError::Subject)));

        assert!(matches!(verifier.verify("not-a-token"), Err(IdentityError::Invalid)));
    }
}
