use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
        services::{
            check_password_strength, hash_password, password_matches, JwtKeys, TokenKind,
            TokenPair,
        },
    },
    error::ApiError,
    extract::JsonBody,
    profile::model::UserProfile,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

fn issue_tokens(state: &AppState, user: UserProfile) -> Result<AuthResponse, ApiError> {
    let TokenPair { access, refresh } = JwtKeys::from_ref(state).issue_pair(user.id)?;
    Ok(AuthResponse {
        access_token: access,
        refresh_token: refresh,
        user,
    })
}

/// Finishing onboarding creates the profile and signs the user in.
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(mut payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let today = state.config.local_now().date();
    payload.profile.validate(today).map_err(|e| {
        warn!(field = e.field, reason = %e.reason, "invalid onboarding data");
        e
    })?;

    check_password_strength(&payload.password).map_err(|e| {
        warn!("password too short");
        e
    })?;

    if state
        .store
        .profile_by_email(&payload.profile.email)
        .await?
        .is_some()
    {
        warn!(email = %payload.profile.email, "email already registered");
        return Err(ApiError::Conflict("E-mail já cadastrado".into()));
    }

    let hash = hash_password(&payload.password)?;
    let profile = payload
        .profile
        .into_profile(hash, OffsetDateTime::now_utc());
    state.store.insert_profile(&profile).await?;

    info!(user_id = %profile.id, email = %profile.email, "profile created");
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, profile)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    let invalid = || ApiError::Unauthorized("Credenciais inválidas".into());

    let Some(user) = state.store.profile_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(invalid());
    };

    if !password_matches(&user, &payload.password)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    info!(user_id = %user.id, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let claims = JwtKeys::from_ref(&state).verify(&payload.refresh_token, TokenKind::Refresh)?;

    let user = state
        .store
        .profile(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Usuário não encontrado".into()))?;
    Ok(Json(issue_tokens(&state, user)?))
}
