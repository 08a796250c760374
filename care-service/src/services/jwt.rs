use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    /// Full session; carries organization context when one is selected.
    Session,
    /// Partial authentication handle, only accepted by organization selection.
    Selection,
}

/// Claims embedded in every token this service issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_role: Option<String>,
    #[serde(default)]
    pub is_owner: bool,
    /// Global roles (e.g. "Sysadmin")
    #[serde(default)]
    pub roles: Vec<String>,
    pub token_use: TokenUse,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature invalid")]
    InvalidSignature,
    #[error("token malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    session_expiry_minutes: i64,
    selection_expiry_minutes: i64,
}

impl JwtService {
    /// RS256 from PEM key files when configured, otherwise HS256 from the
    /// shared secret.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if let (Some(private_path), Some(public_path)) =
            (&config.private_key_path, &config.public_key_path)
        {
            let private_key_pem = fs::read_to_string(private_path).map_err(|e| {
                anyhow::anyhow!("Failed to read private key from {}: {}", private_path, e)
            })?;
            let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
                .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

            let public_key_pem = fs::read_to_string(public_path).map_err(|e| {
                anyhow::anyhow!("Failed to read public key from {}: {}", public_path, e)
            })?;
            let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
                .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

            tracing::info!("JWT service initialized with RS256 keys");

            return Ok(Self {
                encoding_key,
                decoding_key,
                algorithm: Algorithm::RS256,
                issuer: config.issuer.clone(),
                session_expiry_minutes: config.session_expiry_minutes,
                selection_expiry_minutes: config.selection_expiry_minutes,
            });
        }

        let secret = config
            .hmac_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No JWT signing material configured"))?;

        tracing::warn!("JWT service initialized with HS256 shared secret");
        Ok(Self::from_secret(
            secret.as_bytes(),
            &config.issuer,
            config.session_expiry_minutes,
            config.selection_expiry_minutes,
        ))
    }

    pub fn from_secret(
        secret: &[u8],
        issuer: &str,
        session_expiry_minutes: i64,
        selection_expiry_minutes: i64,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: issuer.to_string(),
            session_expiry_minutes,
            selection_expiry_minutes,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign `claims` after stamping issuer, issue time, expiry and id.
    pub fn issue(&self, mut claims: SessionClaims) -> Result<IssuedToken, anyhow::Error> {
        let minutes = match claims.token_use {
            TokenUse::Session => self.session_expiry_minutes,
            TokenUse::Selection => self.selection_expiry_minutes,
        };
        let now = Utc::now();
        let expires_at = now + Duration::minutes(minutes);

        claims.iss = self.issuer.clone();
        claims.iat = now.timestamp();
        claims.exp = expires_at.timestamp();
        claims.jti = Uuid::new_v4().to_string();

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))?;

        Ok(IssuedToken {
            token,
            expires_at,
            expires_in: minutes * 60,
        })
    }

    /// Verify signature, issuer and expiry with no leeway.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }

    pub fn session_expiry_seconds(&self) -> i64 {
        self.session_expiry_minutes * 60
    }
}
