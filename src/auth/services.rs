use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    claims::PendingAccount,
    dto::{AuthResponse, ResetPasswordRequest, SigninRequest, SignupRequest},
    federated::{FederatedIdentity, IdentityError, Provider},
    jwt::{TokenError, TokenKeys, FEDERATED_SESSION_TTL, SIGNIN_SESSION_TTL},
    password::hash_password,
};
use crate::{
    error::{AppError, AppResult},
    mail::{activation_email, reset_email},
    state::AppState,
    users::{
        repo::StoreError,
        repo_types::{PublicUser, UserRecord},
    },
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn sign_failed(e: TokenError) -> AppError {
    AppError::Internal(anyhow::Error::new(e).context("sign token"))
}

fn validate_signup(req: &SignupRequest) -> AppResult<()> {
    if req.name.trim().is_empty() {
        return Err(AppError::bad_request("Name is required"));
    }
    if !is_valid_email(&req.email) {
        return Err(AppError::bad_request("Must be a valid email address"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "Password must be at least 6 characters long",
        ));
    }
    Ok(())
}

/// Validates the signup, then mails an activation link. No user is written yet.
pub async fn signup(state: &AppState, mut req: SignupRequest) -> AppResult<String> {
    req.email = normalize_email(&req.email);
    validate_signup(&req)?;

    if state.users.find_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "signup with registered email");
        return Err(AppError::bad_request("Email is taken."));
    }

    let pending = PendingAccount {
        name: req.name.trim().to_string(),
        email: req.email.clone(),
        password: hash_password(&req.password)?,
    };
    let token = TokenKeys::from_ref(state)
        .sign_activation(&pending)
        .map_err(sign_failed)?;

    let mail = activation_email(&state.config.client_url, &req.email, &token);
    if let Err(e) = state.mailer.send(mail).await {
        warn!(error = %e, email = %req.email, "activation email failed");
        return Err(AppError::upstream("Signup email sent error"));
    }

    info!(email = %req.email, "activation email sent");
    Ok(format!(
        "Email has been sent to {}. Follow the instruction to activate your account.",
        req.email
    ))
}

/// Materializes the user carried by an activation token. A replayed token
/// hits the email uniqueness check and creates nothing.
pub async fn activate(state: &AppState, token: &str) -> AppResult<PublicUser> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("There is no activation token."));
    }

    let pending = TokenKeys::from_ref(state)
        .verify_activation(token)
        .map_err(|e| {
            warn!(error = %e, "activation token rejected");
            AppError::unauthorized("Expired link. Signup again.")
        })?;

    let user = UserRecord::new(pending.name, pending.email, pending.password);
    let user = state.users.insert(user).await?;
    info!(user_id = %user.id, email = %user.email, "account activated");
    Ok(user.to_public())
}

pub async fn signin(state: &AppState, req: SigninRequest) -> AppResult<AuthResponse> {
    let email = normalize_email(&req.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "signin unknown email");
        return Err(AppError::bad_request("User does not exist."));
    };

    if !user.authenticate(&req.password) {
        warn!(%email, user_id = %user.id, "signin invalid password");
        return Err(AppError::bad_request("Email and password do not match"));
    }

    let token = TokenKeys::from_ref(state)
        .sign_session(user.id, SIGNIN_SESSION_TTL)
        .map_err(sign_failed)?;

    info!(user_id = %user.id, "user signed in");
    Ok(AuthResponse {
        token,
        user: user.to_public(),
    })
}

/// Stores a fresh reset token on the user and mails it.
pub async fn forgot_password(state: &AppState, email: &str) -> AppResult<String> {
    let email = normalize_email(email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        return Err(AppError::not_found("User with that email does not exist"));
    };

    let token = TokenKeys::from_ref(state)
        .sign_reset(user.id, &user.name)
        .map_err(sign_failed)?;

    if let Err(e) = state.users.set_reset_link(user.id, &token).await {
        warn!(error = %e, user_id = %user.id, "persist reset link failed");
        return Err(AppError::bad_request("Update user error"));
    }

    let mail = reset_email(&state.config.client_url, &email, &token);
    if let Err(e) = state.mailer.send(mail).await {
        warn!(error = %e, %email, "reset email failed");
        return Err(AppError::upstream("Reset email sent error"));
    }

    info!(user_id = %user.id, "reset email sent");
    Ok(format!(
        "Email has been sent to {email}. Follow the instruction to reset your account."
    ))
}

/// Consumes a reset link: it must verify and still be the one stored on the user.
/// The link check and the password write are one store call.
pub async fn reset_password(state: &AppState, req: ResetPasswordRequest) -> AppResult<()> {
    let link = req.reset_password_link.trim();
    if link.is_empty() {
        return Err(AppError::bad_request("Expired link. Try again."));
    }

    let claims = TokenKeys::from_ref(state).verify_reset(link).map_err(|e| {
        warn!(error = %e, "reset token rejected");
        AppError::bad_request("Expired link. Try again.")
    })?;

    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(
            "Password should be min 6 characters long",
        ));
    }

    let digest = hash_password(&req.new_password)?;
    let Some(user) = state
        .users
        .consume_reset_link(claims.sub, link, &digest)
        .await?
    else {
        warn!(user_id = %claims.sub, "reset link not on record");
        return Err(AppError::bad_request("Something went wrong. Try later."));
    };

    info!(user_id = %user.id, "password reset");
    Ok(())
}

/// Password for accounts created through a provider. Never disclosed, so such
/// accounts can only sign in through the provider unless they reset it.
fn federated_password(email: &str, secret: &str) -> String {
    format!("{email}{secret}")
}

async fn find_or_create(
    state: &AppState,
    provider: Provider,
    identity: FederatedIdentity,
) -> AppResult<UserRecord> {
    if let Some(user) = state.users.find_by_email(&identity.email).await? {
        return Ok(user);
    }

    let password = federated_password(&identity.email, &state.config.jwt.session_secret);
    let user = UserRecord::with_password(&identity.name, &identity.email, &password)?;
    match state.users.insert(user).await {
        Ok(user) => {
            info!(user_id = %user.id, provider = provider.label(), "federated account created");
            Ok(user)
        }
        // Lost a race with a concurrent first login for the same email.
        Err(StoreError::DuplicateEmail(_)) => state
            .users
            .find_by_email(&identity.email)
            .await?
            .ok_or_else(|| AppError::bad_request(format!("User signup failed with {}", provider.label()))),
        Err(e) => {
            warn!(error = %e, provider = provider.label(), "federated account save failed");
            Err(AppError::bad_request(format!(
                "User signup failed with {}",
                provider.label()
            )))
        }
    }
}

async fn federated_login(
    state: &AppState,
    provider: Provider,
    verified: Result<FederatedIdentity, IdentityError>,
) -> AppResult<AuthResponse> {
    let identity = verified.map_err(|e| {
        warn!(error = %e, provider = provider.label(), "provider verification failed");
        AppError::bad_request(format!("{} login failed. Try again", provider.label()))
    })?;

    let user = find_or_create(state, provider, identity).await?;
    let token = TokenKeys::from_ref(state)
        .sign_session(user.id, FEDERATED_SESSION_TTL)
        .map_err(sign_failed)?;

    Ok(AuthResponse {
        token,
        user: user.to_public(),
    })
}

pub async fn google_login(state: &AppState, id_token: &str) -> AppResult<AuthResponse> {
    let verified = state.identity.verify_google(id_token).await;
    federated_login(state, Provider::Google, verified).await
}

pub async fn facebook_login(
    state: &AppState,
    user_id: &str,
    access_token: &str,
) -> AppResult<AuthResponse> {
    let verified = state.identity.fetch_facebook(user_id, access_token).await;
    federated_login(state, Provider::Facebook, verified).await
}
