use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password, PasswordDigest};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// User document as persisted. Credentials stay on this type and never
/// reach a response; handlers go through [`PublicUser`].
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub salt: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    /// Outstanding reset token, empty when none.
    pub reset_password_link: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserRecord {
    /// New `user`-role document from an already hashed credential.
    pub fn new(name: impl Into<String>, email: impl Into<String>, digest: PasswordDigest) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            hashed_password: digest.hash,
            salt: digest.salt,
            role: Role::User,
            reset_password_link: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_password(
        name: impl Into<String>,
        email: impl Into<String>,
        plain: &str,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(name, email, hash_password(plain)?))
    }

    /// Malformed stored hashes count as a mismatch.
    pub fn authenticate(&self, plain: &str) -> bool {
        match verify_password(plain, &self.hashed_password) {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, user_id = %self.id, "stored password hash unreadable");
                false
            }
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Fields a profile update writes. `password` stays `None` to keep the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: String,
    pub password: Option<PasswordDigest>,
}

/// User as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
