use axum::{
    extract::State,
    routing::{post, put},
    Router,
};
use tracing::instrument;

use super::{
    dto::{
        ActivationRequest, AuthResponse, FacebookLoginRequest, ForgotPasswordRequest,
        GoogleLoginRequest, MessageResponse, ResetPasswordRequest, SigninRequest, SignupRequest,
    },
    services,
};
use crate::{error::AppResult, extract::Json, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/account-activation", post(account_activation))
        .route("/auth/signin", post(signin))
        .route("/auth/forgot-password", put(forgot_password))
        .route("/auth/reset-password", put(reset_password))
        .route("/auth/google-login", post(google_login))
        .route("/auth/facebook-login", post(facebook_login))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<Json<MessageResponse>> {
    let message = services::signup(&state, payload).await?;
    Ok(Json(MessageResponse::new(message)))
}

#[instrument(skip(state, payload))]
pub async fn account_activation(
    State(state): State<AppState>,
    Json(payload): Json<ActivationRequest>,
) -> AppResult<Json<MessageResponse>> {
    services::activate(&state, &payload.token).await?;
    Ok(Json(MessageResponse::new("Signup Success. Please Sign in.")))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn signin(
    State(state): State<AppState>,
    Json(payload): Json<SigninRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(services::signin(&state, payload).await?))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let message = services::forgot_password(&state, &payload.email).await?;
    Ok(Json(MessageResponse::new(message)))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    services::reset_password(&state, payload).await?;
    Ok(Json(MessageResponse::new(
        "Great! Now you can login with your new password.",
    )))
}

#[instrument(skip(state, payload))]
pub async fn google_login(
    State(state): State<AppState>,
    Json(payload): Json<GoogleLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(services::google_login(&state, &payload.id_token).await?))
}

#[instrument(skip(state, payload), fields(user_id = %payload.user_id))]
pub async fn facebook_login(
    State(state): State<AppState>,
    Json(payload): Json<FacebookLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(
        services::facebook_login(&state, &payload.user_id, &payload.access_token).await?,
    ))
}
