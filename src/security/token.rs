use std::sync::Arc;
use std::time::{Duration, SystemTime};

use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::{self, JwtPayload};

use crate::bus::Bus;
use crate::errors::{BackendError, Result};
use crate::model::TokenClaims;
use crate::operations::security::{CreateToken, VerifyToken};
use crate::settings::Auth as AuthCfg;

/// HS256 session tokens whose subject is the user id.
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<[u8]>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(cfg: &AuthCfg) -> Self {
        Self {
            secret: Arc::from(cfg.jwt_secret.as_bytes()),
            ttl: Duration::from_secs(cfg.token_ttl_secs),
        }
    }

    pub fn create(&self, user_id: i32) -> Result<String> {
        let now = SystemTime::now();
        let mut payload = JwtPayload::new();
        payload.set_subject(user_id.to_string());
        payload.set_issued_at(&now);
        payload.set_expires_at(&(now + self.ttl));

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        let signer = HS256.signer_from_bytes(&self.secret[..])?;
        jwt::encode_with_signer(&payload, &header, &signer).map_err(|e| {
            tracing::error!(error = %e, user_id, "Token signing failed");
            BackendError::TokenCreationFailed
        })
    }

    /// Claims of a valid, unexpired token. Anything else is `None`.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        let verifier = match HS256.verifier_from_bytes(&self.secret[..]) {
            Ok(verifier) => verifier,
            Err(e) => {
                tracing::error!(error = %e, "Cannot build token verifier");
                return None;
            }
        };
        let (payload, _) = jwt::decode_with_verifier(token, &verifier).ok()?;

        // Signature checks do not cover expiry.
        let expires_at = payload.expires_at()?;
        if expires_at <= SystemTime::now() {
            tracing::debug!("Rejected expired token");
            return None;
        }

        let user_id = payload.subject()?.parse().ok()?;
        Some(TokenClaims { user_id })
    }

    /// Answer token creation and verification on the bus.
    pub fn register(self, bus: &Bus) -> Result<()> {
        let service = self.clone();
        bus.on_ask::<VerifyToken, _, _>(move |token| {
            let claims = token.and_then(|t| service.verify(&t));
            async move { Ok(claims) }
        })?;

        bus.on_ask::<CreateToken, _, _>(move |user_id| {
            let token = self.create(user_id);
            async move { token }
        })?;
        Ok(())
    }
}
