use axum::{
    extract::{Path, State},
    routing::{get, put},
    Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::UpdateUserRequest,
    repo_types::{ProfileUpdate, PublicUser},
};
use crate::{
    auth::{
        extractors::{AdminUser, AuthUser},
        password::hash_password,
        services::MIN_PASSWORD_LEN,
    },
    error::{AppError, AppResult},
    extract::Json,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/update", put(update_user))
        .route("/user/admin/update", put(admin_update_user))
        .route("/user/:id", get(get_user))
}

fn profile_update(req: &UpdateUserRequest) -> AppResult<ProfileUpdate> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Name is required"));
    }
    let password = match req.new_password() {
        Some(password) if password.chars().count() < MIN_PASSWORD_LEN => {
            return Err(AppError::bad_request(
                "Password should be min 6 characters long",
            ));
        }
        Some(password) => Some(hash_password(password)?),
        None => None,
    };
    Ok(ProfileUpdate {
        name: name.to_string(),
        password,
    })
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let id = Uuid::parse_str(id.trim()).map_err(|_| AppError::bad_request("Invalid user id"))?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(user.to_public()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(%user_id, "session for unknown user");
        AppError::bad_request("User not found")
    })?;

    let change = profile_update(&payload)?;
    let saved = state.users.update_profile(user.id, &change).await?;
    info!(%user_id, "profile updated");
    Ok(Json(saved.to_public()))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.id))]
pub async fn admin_update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let target = match payload.id {
        Some(id) if id != admin.id => state
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?,
        _ => admin,
    };

    let change = profile_update(&payload)?;
    let saved = state.users.update_profile(target.id, &change).await?;
    info!(user_id = %saved.id, "profile updated by admin");
    Ok(Json(saved.to_public()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    #[test]
    fn update_requires_name() {
        let err = profile_update(&UpdateUserRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), "Name is required");
    }

    #[test]
    fn blank_password_keeps_current_one() {
        let req = UpdateUserRequest {
            name: " Alice ".into(),
            password: Some(String::new()),
            id: None,
        };
        let change = profile_update(&req).unwrap();
        assert_eq!(change.name, "Alice");
        assert!(change.password.is_none());
    }

    #[test]
    fn update_rejects_short_password() {
        let req = UpdateUserRequest {
            name: "Alice".into(),
            password: Some("123".into()),
            id: None,
        };
        let err = profile_update(&req).unwrap_err();
        assert_eq!(err.to_string(), "Password should be min 6 characters long");
    }

    #[test]
    fn update_hashes_new_password() {
        let req = UpdateUserRequest {
            name: "A".into(),
            password: Some("another1".into()),
            id: None,
        };
        let digest = profile_update(&req).unwrap().password.expect("new digest");
        assert_ne!(digest.hash, "another1");
        assert!(verify_password("another1", &digest.hash).unwrap());
    }
}
