use std::{sync::Arc, time::Duration};

use crate::auth::federated::{HttpIdentityProvider, IdentityProvider};
use crate::config::AppConfig;
use crate::db;
use crate::mail::{Mailer, SendGridMailer};
use crate::users::repo::{PgUserStore, UserStore};

/// Service handles shared by every request. Built once in `init`, released in `shutdown`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config.database_url).await?;
        db::migrate(&pool).await?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("accountd/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()?;

        let users = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;
        let mailer = Arc::new(SendGridMailer::new(http.clone(), &config.mail)) as Arc<dyn Mailer>;
        let identity =
            Arc::new(HttpIdentityProvider::new(http, &config.oauth)) as Arc<dyn IdentityProvider>;

        Ok(Self::from_parts(config, users, mailer, identity))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            users,
            mailer,
            identity,
        }
    }

    pub async fn shutdown(&self) {
        self.users.close().await;
        tracing::info!("user store closed");
    }
}
