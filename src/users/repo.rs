use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{ProfileUpdate, UserRecord};
use crate::auth::password::PasswordDigest;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email `{0}` is already registered")]
    DuplicateEmail(String),
    #[error("user {0} does not exist")]
    Missing(Uuid),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence of user documents. Each call is atomic on its own; writes only
/// touch the columns their operation owns.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: UserRecord) -> Result<UserRecord, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    /// Replaces the outstanding reset link of `id`.
    async fn set_reset_link(&self, id: Uuid, link: &str) -> Result<(), StoreError>;
    /// Swaps in `password` and clears the link, only if `link` is still the one on
    /// record for `id`. `None` means the link was never issued or is already spent.
    async fn consume_reset_link(
        &self,
        id: Uuid,
        link: &str,
        password: &PasswordDigest,
    ) -> Result<Option<UserRecord>, StoreError>;
    async fn update_profile(
        &self,
        id: Uuid,
        change: &ProfileUpdate,
    ) -> Result<UserRecord, StoreError>;
    async fn close(&self) {}
}

const USER_COLUMNS: &str = "id, name, email, hashed_password, salt, role, reset_password_link, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_error(e: sqlx::Error, email: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateEmail(email.to_string())
        }
        _ => StoreError::Backend(anyhow::Error::new(e).context("write user")),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: UserRecord) -> Result<UserRecord, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, hashed_password, salt, role, reset_password_link, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.hashed_password)
            .bind(&user.salt)
            .bind(user.role.as_str())
            .bind(&user.reset_password_link)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.db)
            .await
            .map_err(|e| map_write_error(e, &user.email))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    async fn set_reset_link(&self, id: Uuid, link: &str) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE users SET reset_password_link = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(link)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.db)
        .await
        .context("set reset link")?;
        if done.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn consume_reset_link(
        &self,
        id: Uuid,
        link: &str,
        password: &PasswordDigest,
    ) -> Result<Option<UserRecord>, StoreError> {
        if link.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            r#"
            UPDATE users
               SET hashed_password = $3, salt = $4, reset_password_link = '', updated_at = $5
             WHERE id = $1 AND reset_password_link = $2
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(link)
            .bind(&password.hash)
            .bind(&password.salt)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(&self.db)
            .await
            .context("consume reset link")?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        change: &ProfileUpdate,
    ) -> Result<UserRecord, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = $2,
                   hashed_password = COALESCE($3, hashed_password),
                   salt = COALESCE($4, salt),
                   updated_at = $5
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(&change.name)
            .bind(change.password.as_ref().map(|d| d.hash.as_str()))
            .bind(change.password.as_ref().map(|d| d.salt.as_str()))
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(&self.db)
            .await
            .context("update profile")?
            .ok_or(StoreError::Missing(id))
    }

    async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
pub use memory::MemoryUserStore;

#[cfg(test)]
mod memory {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use time::OffsetDateTime;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    use super::{StoreError, UserStore};
    use crate::auth::password::PasswordDigest;
    use crate::users::repo_types::{ProfileUpdate, UserRecord};

    /// In-process store with the same uniqueness rules as the `users` table.
    #[derive(Default)]
    pub struct MemoryUserStore {
        users: RwLock<HashMap<Uuid, UserRecord>>,
    }

    impl MemoryUserStore {
        pub async fn len(&self) -> usize {
            self.users.read().await.len()
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn insert(&self, user: UserRecord) -> Result<UserRecord, StoreError> {
            let mut users = self.users.write().await;
            if users.values().any(|u| u.email == user.email) {
                return Err(StoreError::DuplicateEmail(user.email));
            }
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
            Ok(self.users.read().await.get(&id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
            Ok(self
                .users
                .read()
                .await
                .values()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn set_reset_link(&self, id: Uuid, link: &str) -> Result<(), StoreError> {
            let mut users = self.users.write().await;
            let user = users.get_mut(&id).ok_or(StoreError::Missing(id))?;
            user.reset_password_link = link.to_string();
            user.updated_at = OffsetDateTime::now_utc();
            Ok(())
        }

        async fn consume_reset_link(
            &self,
            id: Uuid,
            link: &str,
            password: &PasswordDigest,
        ) -> Result<Option<UserRecord>, StoreError> {
            let mut users = self.users.write().await;
            match users.get_mut(&id) {
                Some(user) if !link.is_empty() && user.reset_password_link == link => {
                    user.hashed_password = password.hash.clone();
                    user.salt = password.salt.clone();
                    user.reset_password_link.clear();
                    user.updated_at = OffsetDateTime::now_utc();
                    Ok(Some(user.clone()))
                }
                _ => Ok(None),
            }
        }

        async fn update_profile(
            &self,
            id: Uuid,
            change: &ProfileUpdate,
        ) -> Result<UserRecord, StoreError> {
            let mut users = self.users.write().await;
            let user = users.get_mut(&id).ok_or(StoreError::Missing(id))?;
            user.name = change.name.clone();
            if let Some(digest) = &change.password {
                user.hashed_password = digest.hash.clone();
                user.salt = digest.salt.clone();
            }
            user.updated_at = OffsetDateTime::now_utc();
            Ok(user.clone())
        }
    }

    mod tests {
        use super::*;
        use crate::auth::password::hash_password;

        #[tokio::test]
        async fn rejects_duplicate_email() {
            let store = MemoryUserStore::default();
            store
                .insert(UserRecord::with_password("A", "a@x.com", "secret1").unwrap())
                .await
                .unwrap();
            let err = store
                .insert(UserRecord::with_password("B", "a@x.com", "secret2").unwrap())
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::DuplicateEmail(e) if e == "a@x.com"));
            assert_eq!(store.len().await, 1);
        }

        #[tokio::test]
        async fn reset_link_is_consumed_once() {
            let store = MemoryUserStore::default();
            let user = store
                .insert(UserRecord::with_password("A", "a@x.com", "secret1").unwrap())
                .await
                .unwrap();
            store.set_reset_link(user.id, "tok").await.unwrap();

            let digest = hash_password("newpass1").unwrap();
            let updated = store
                .consume_reset_link(user.id, "tok", &digest)
                .await
                .unwrap()
                .expect("link on record");
            assert!(updated.reset_password_link.is_empty());
            assert!(updated.authenticate("newpass1"));

            let again = store.consume_reset_link(user.id, "tok", &digest).await.unwrap();
            assert!(again.is_none());
        }

        #[tokio::test]
        async fn empty_reset_link_never_matches() {
            let store = MemoryUserStore::default();
            let user = store
                .insert(UserRecord::with_password("A", "a@x.com", "secret1").unwrap())
                .await
                .unwrap();
            let digest = hash_password("newpass1").unwrap();
            let res = store.consume_reset_link(user.id, "", &digest).await.unwrap();
            assert!(res.is_none());
            let stored = store.find_by_id(user.id).await.unwrap().unwrap();
            assert!(stored.authenticate("secret1"));
        }

        #[tokio::test]
        async fn writes_require_existing_document() {
            let store = MemoryUserStore::default();
            let id = Uuid::new_v4();
            let err = store.set_reset_link(id, "tok").await.unwrap_err();
            assert!(matches!(err, StoreError::Missing(missing) if missing == id));
            let change = ProfileUpdate {
                name: "A".into(),
                password: None,
            };
            let err = store.update_profile(id, &change).await.unwrap_err();
            assert!(matches!(err, StoreError::Missing(missing) if missing == id));
        }

        #[tokio::test]
        async fn profile_update_leaves_reset_link_alone() {
            let store = MemoryUserStore::default();
            let user = store
                .insert(UserRecord::with_password("A", "a@x.com", "secret1").unwrap())
                .await
                .unwrap();
            store.set_reset_link(user.id, "tok").await.unwrap();

            let change = ProfileUpdate {
                name: "Alice".into(),
                password: None,
            };
            let updated = store.update_profile(user.id, &change).await.unwrap();
            assert_eq!(updated.name, "Alice");
            assert_eq!(updated.reset_password_link, "tok");
            assert!(updated.authenticate("secret1"));
        }
    }
}
