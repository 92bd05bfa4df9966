//! Buyer authentication.
//!
//! Identity and token issuance live in a separate service; this server only verifies that a request carries a valid
//! HS256 bearer token signed with the shared `PSG_JWT_SECRET`. The token's `sub` claim is the buyer id used
//! throughout the order flow.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerClaims {
    /// The buyer's stable identifier.
    pub sub: String,
    /// Expiry, as a unix timestamp.
    pub exp: usize,
}

impl FromRequest for BuyerClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_claims(req))
    }
}

fn extract_claims(req: &HttpRequest) -> Result<BuyerClaims, ServerError> {
    let config = req
        .app_data::<web::Data<AuthConfig>>()
        .ok_or_else(|| ServerError::InitializeError("The authentication configuration is not loaded".to_string()))?;
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    let token = header.strip_prefix("Bearer ").ok_or(AuthError::MissingToken)?;
    let key = DecodingKey::from_secret(config.jwt_secret.reveal().as_bytes());
    let data = decode::<BuyerClaims>(token, &key, &Validation::new(Algorithm::HS256)).map_err(|e| {
        warn!("🔐️ Rejecting access token: {e}");
        AuthError::ValidationError(e.to_string())
    })?;
    Ok(data.claims)
}

/// Issue a token for the given claims. The identity service does this in production; this helper exists for local
/// tooling and tests.
pub fn issue_access_token(claims: &BuyerClaims, secret: &str) -> Result<String, ServerError> {
    encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ServerError::CouldNotSerializeAccessToken(e.to_string()))
}
