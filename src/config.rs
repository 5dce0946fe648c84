use anyhow::Context;
use serde::Deserialize;

/// Secrets and claims shared by every token kind.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub session_secret: String,
    pub activation_secret: String,
    pub reset_secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    pub sendgrid_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub google_client_id: String,
    pub google_tokeninfo_url: String,
    pub facebook_graph_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Frontend origin used to build activation and reset links.
    pub client_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub oauth: OAuthConfig,
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("missing environment variable {key}"))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let client_url = std::env::var("CLIENT_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();
        let jwt = JwtConfig {
            session_secret: required("JWT_SECRET")?,
            activation_secret: required("JWT_ACCOUNT_ACTIVATION")?,
            reset_secret: required("JWT_RESET_PASSWORD")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "accountd".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "accountd-users".into()),
        };
        let mail = MailConfig {
            from: required("EMAIL_FROM")?,
            sendgrid_api_key: required("SENDGRID_API_KEY")?,
        };
        let oauth = OAuthConfig {
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_tokeninfo_url: std::env::var("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/tokeninfo".into()),
            facebook_graph_url: std::env::var("FACEBOOK_GRAPH_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/v2.11".into()),
        };
        Ok(Self {
            database_url,
            client_url,
            jwt,
            mail,
            oauth,
        })
    }
}
