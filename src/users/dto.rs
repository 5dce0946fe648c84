use serde::Deserialize;
use uuid::Uuid;

/// Body of the profile update routes. `id` is only honored on the admin route.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "_id")]
    pub id: Option<Uuid>,
}

impl UpdateUserRequest {
    /// An empty password field means "keep the current one".
    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}
