//! Bearer-token verification.
//!
//! Identity issuance lives with an external provider; this module only
//! checks the tokens it hands out. [`JwtVerifier`] accepts HS256-signed JWTs
//! and reads the subject and a display name from the claims.

use agora_core::connection::Identity;
use axum::{
  extract::{Query, Request, State},
  http::{HeaderMap, Uri, header},
  middleware::Next,
  response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{Error, Result};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
  #[error("token expired")]
  Expired,
  #[error("invalid token: {0}")]
  Invalid(String),
}

/// Turns a bearer credential into a verified [`Identity`].
pub trait TokenVerifier: Send + Sync {
  fn verify(&self, token: &str) -> Result<Identity, VerificationError>;
}

// ─── JWT ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Claims {
  sub:              String,
  #[serde(rename = "cognito:username")]
  cognito_username: Option<String>,
  name:             Option<String>,
  username:         Option<String>,
}

pub struct JwtVerifier {
  key:        DecodingKey,
  validation: Validation,
}

impl JwtVerifier {
  pub fn new(secret: &str, issuer: Option<&str>, audience: Option<&str>) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(issuer) = issuer {
      validation.set_issuer(&[issuer]);
    }
    match audience {
      Some(audience) => validation.set_audience(&[audience]),
      None => validation.validate_aud = false,
    }
    Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
  }
}

impl TokenVerifier for JwtVerifier {
  fn verify(&self, token: &str) -> Result<Identity, VerificationError> {
    let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
      .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => VerificationError::Expired,
        _ => VerificationError::Invalid(e.to_string()),
      })?;

    let claims = data.claims;
    if claims.sub.trim().is_empty() {
      return Err(VerificationError::Invalid("empty subject".into()));
    }
    let name = claims
      .cognito_username
      .or(claims.name)
      .or(claims.username)
      .unwrap_or_else(|| claims.sub.clone());
    Ok(Identity::new(claims.sub, name))
  }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TokenParams {
  pub token: Option<String>,
}

/// The bearer token from an `Authorization: Bearer` header, else from the
/// `token` query parameter.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
  let from_header = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .map(str::to_owned);

  from_header.or_else(|| {
    Query::<TokenParams>::try_from_uri(uri)
      .ok()
      .and_then(|Query(p)| p.token)
      .filter(|t| !t.is_empty())
  })
}

/// Verify the caller and expose their [`Identity`] to downstream handlers as
/// a request extension.
pub fn authenticate(
  verifier: &dyn TokenVerifier,
  headers: &HeaderMap,
  uri: &Uri,
) -> Result<Identity> {
  let token = extract_token(headers, uri).ok_or(Error::Unauthorized)?;
  verifier.verify(&token).map_err(|e| {
    tracing::debug!(error = %e, "token rejected");
    Error::Unauthorized
  })
}

/// Middleware: 401 unless the request carries a valid token.
pub async fn require_identity(
  State(verifier): State<Arc<dyn TokenVerifier>>,
  mut req: Request,
  next: Next,
) -> Result<Response> {
  let identity = authenticate(verifier.as_ref(), req.headers(), req.uri())?;
  req.extensions_mut().insert(identity);
  Ok(next.run(req).await)
}
