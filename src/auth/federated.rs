use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::OAuthConfig;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn label(self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Facebook => "Facebook",
        }
    }
}

/// Identity vouched for by a third-party provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub email: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected credential: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_google(&self, id_token: &str) -> Result<FederatedIdentity, IdentityError>;
    async fn fetch_facebook(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<FederatedIdentity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    email: Option<String>,
    /// tokeninfo reports this as the string "true" as often as a bool.
    #[serde(default)]
    email_verified: serde_json::Value,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    email: Option<String>,
    name: Option<String>,
}

fn display_name(name: Option<String>, email: &str) -> String {
    name.filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

fn google_identity(info: GoogleTokenInfo, client_id: &str) -> Result<FederatedIdentity, IdentityError> {
    if info.aud != client_id {
        return Err(IdentityError::Rejected("audience mismatch".into()));
    }
    let verified = match &info.email_verified {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s == "true",
        _ => false,
    };
    if !verified {
        return Err(IdentityError::Rejected("email not verified".into()));
    }
    let email = info
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| IdentityError::Rejected("no email in id token".into()))?;
    Ok(FederatedIdentity {
        name: display_name(info.name, &email),
        email,
    })
}

fn facebook_identity(profile: FacebookProfile) -> Result<FederatedIdentity, IdentityError> {
    let email = profile
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| IdentityError::Rejected("no email in profile".into()))?;
    Ok(FederatedIdentity {
        name: display_name(profile.name, &email),
        email,
    })
}

/// Google tokeninfo and Facebook Graph over HTTPS.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    google_client_id: String,
    google_tokeninfo_url: String,
    facebook_graph_url: String,
}

impl HttpIdentityProvider {
    pub fn new(client: Client, cfg: &OAuthConfig) -> Self {
        Self {
            client,
            google_client_id: cfg.google_client_id.clone(),
            google_tokeninfo_url: cfg.google_tokeninfo_url.clone(),
            facebook_graph_url: cfg.facebook_graph_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_google(&self, id_token: &str) -> Result<FederatedIdentity, IdentityError> {
        if self.google_client_id.is_empty() {
            return Err(IdentityError::Rejected("google login is not configured".into()));
        }
        let res = self
            .client
            .get(&self.google_tokeninfo_url)
            .query(&[("id_token", id_token)])
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await?;
        if !res.status().is_success() {
            warn!(status = %res.status(), "google tokeninfo rejected id token");
            return Err(IdentityError::Rejected(format!("tokeninfo returned {}", res.status())));
        }
        let info: GoogleTokenInfo = res.json().await?;
        let identity = google_identity(info, &self.google_client_id)?;
        debug!(email = %identity.email, "google identity verified");
        Ok(identity)
    }

    async fn fetch_facebook(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<FederatedIdentity, IdentityError> {
        if user_id.is_empty() || !user_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(IdentityError::Rejected("malformed userID".into()));
        }
        let url = format!("{}/{}/", self.facebook_graph_url, user_id);
        let res = self
            .client
            .get(url)
            .query(&[("fields", "id,name,email"), ("access_token", access_token)])
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await?;
        if !res.status().is_success() {
            warn!(status = %res.status(), "facebook graph rejected access token");
            return Err(IdentityError::Rejected(format!("graph returned {}", res.status())));
        }
        let profile: FacebookProfile = res.json().await?;
        let identity = facebook_identity(profile)?;
        debug!(email = %identity.email, "facebook identity fetched");
        Ok(identity)
    }
}

#[cfg(test)]
pub use scripted::ScriptedIdentityProvider;
