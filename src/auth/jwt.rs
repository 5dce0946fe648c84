use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, PendingAccount, ResetClaims, SessionClaims, TokenKind};
use crate::{config::JwtConfig, state::AppState};

pub const ACTIVATION_TTL: Duration = Duration::days(3);
pub const SIGNIN_SESSION_TTL: Duration = Duration::days(1);
pub const FEDERATED_SESSION_TTL: Duration = Duration::days(7);
pub const RESET_TTL: Duration = Duration::minutes(10);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, expired, wrong issuer/audience or wrong kind.
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("failed to sign token")]
    Sign(#[source] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signing and verification keys for every token kind.
#[derive(Clone)]
pub struct TokenKeys {
    activation: KeyPair,
    session: KeyPair,
    reset: KeyPair,
    issuer: String,
    audience: String,
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        TokenKeys::from_config(&state.config.jwt)
    }
}

impl TokenKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            activation: KeyPair::from_secret(&cfg.activation_secret),
            session: KeyPair::from_secret(&cfg.session_secret),
            reset: KeyPair::from_secret(&cfg.reset_secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Activation => &self.activation,
            TokenKind::Session => &self.session,
            TokenKind::Reset => &self.reset,
        }
    }

    fn sign<T: Serialize>(&self, kind: TokenKind, data: T, ttl: Duration) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let exp = now + ttl;
        let claims = Claims {
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            data,
        };
        let token = encode(&Header::default(), &claims, &self.keys(kind).encoding)
            .map_err(TokenError::Sign)?;
        debug!(kind = ?kind, "jwt signed");
        Ok(token)
    }

    /// Full envelope of a valid token of `kind`.
    pub(crate) fn claims<T: DeserializeOwned>(
        &self,
        kind: TokenKind,
        token: &str,
    ) -> Result<Claims<T>, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims<T>>(token, &self.keys(kind).decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;
        if data.claims.kind != kind {
            return Err(TokenError::Invalid(format!(
                "expected {kind:?} token, got {:?}",
                data.claims.kind
            )));
        }
        debug!(kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    fn verify<T: DeserializeOwned>(&self, kind: TokenKind, token: &str) -> Result<T, TokenError> {
        self.claims(kind, token).map(|c| c.data)
    }

    pub fn sign_activation(&self, pending: &PendingAccount) -> Result<String, TokenError> {
        self.sign(TokenKind::Activation, pending, ACTIVATION_TTL)
    }

    pub fn verify_activation(&self, token: &str) -> Result<PendingAccount, TokenError> {
        self.verify(TokenKind::Activation, token)
    }

    pub fn sign_session(&self, user_id: Uuid, ttl: Duration) -> Result<String, TokenError> {
        self.sign(TokenKind::Session, SessionClaims { sub: user_id }, ttl)
    }

    pub fn verify_session(&self, token: &str) -> Result<Uuid, TokenError> {
        self.verify::<SessionClaims>(TokenKind::Session, token)
            .map(|c| c.sub)
    }

    pub fn sign_reset(&self, user_id: Uuid, name: &str) -> Result<String, TokenError> {
        let claims = ResetClaims {
            sub: user_id,
            name: name.to_string(),
        };
        self.sign(TokenKind::Reset, claims, RESET_TTL)
    }

    pub fn verify_reset(&self, token: &str) -> Result<ResetClaims, TokenError> {
        self.verify(TokenKind::Reset, token)
    }
}

#[cfg(test)]
pub(crate) fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        session_secret: "session-secret".into(),
        activation_secret: "activation-secret".into(),
        reset_secret: "reset-secret".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
    }
}
