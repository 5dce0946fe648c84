use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::password::PasswordDigest;

/// Purpose of a token. Each kind is signed with its own secret.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Activation,
    Session,
    Reset,
}

/// JWT envelope; `data` is flattened next to the registered claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims<T> {
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub kind: TokenKind,
    #[serde(flatten)]
    pub data: T,
}

/// Signup fields carried by an activation token until the account exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAccount {
    pub name: String,
    pub email: String,
    pub password: PasswordDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: Uuid,
    pub name: String,
}
