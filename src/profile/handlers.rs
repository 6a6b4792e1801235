use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::model::{ProfileUpdate, UserProfile};
use crate::{auth::services::AuthUser, error::ApiError, extract::JsonBody, state::AppState};

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me).delete(delete_me))
}

async fn load(state: &AppState, user_id: uuid::Uuid) -> Result<UserProfile, ApiError> {
    state.store.profile(user_id).await?.ok_or_else(|| {
        warn!(%user_id, "profile not found for valid token");
        ApiError::Unauthorized("Usuário não encontrado".into())
    })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(load(&state, user_id).await?))
}

#[instrument(skip(state))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    let mut profile = load(&state, user_id).await?;
    let previous_email = profile.email.clone();
    let today = state.config.local_now().date();
    payload.apply(&mut profile, today)?;

    if profile.email != previous_email {
        if let Some(other) = state.store.profile_by_email(&profile.email).await? {
            if other.id != user_id {
                warn!(%user_id, email = %profile.email, "email taken by another profile");
                return Err(ApiError::Conflict("E-mail já cadastrado".into()));
            }
        }
    }
    state.store.update_profile(&profile).await?;
    info!(%user_id, "profile updated");
    Ok(Json(profile))
}

/// "Clear all": the profile and everything recorded for it.
#[instrument(skip(state))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, ApiError> {
    state.tracker.clear_all(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod me_tests {
    use crate::app::build_app;
    use crate::state::{signed_in, AppState};
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(state: &AppState, method: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri("/api/v1/me")
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn get_me_requires_token() {
        let state = AppState::fake();
        let (status, json) = call(&state, "GET", "garbage", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "unauthorized");
    }

    #[tokio::test]
    async fn edit_rederives_water_goal() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;

        let (status, json) = call(&state, "PUT", &token, Some(json!({ "currentWeight": 60.0 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["waterGoalMl"], 2100);

        let (status, _) = call(&state, "PUT", &token, Some(json!({ "calorieGoal": 50 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, json) = call(&state, "GET", &token, None).await;
        assert_eq!(json["currentWeightKg"], 60.0);
        assert_eq!(json["calorieGoalKcal"], 2000);
    }

    #[tokio::test]
    async fn email_and_gender_can_be_edited() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;

        let (status, json) = call(
            &state,
            "PUT",
            &token,
            Some(json!({ "email": "Ana2@Example.com", "gender": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["email"], "ana2@example.com");
        assert_eq!(json["gender"], Value::Null);

        let mut other = crate::profile::model::sample_profile();
        other.id = uuid::Uuid::new_v4();
        other.email = "taken@example.com".into();
        state.store.insert_profile(&other).await.unwrap();

        let (status, json) = call(&state, "PUT", &token, Some(json!({ "email": "taken@example.com" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "conflict");
        let (_, json) = call(&state, "GET", &token, None).await;
        assert_eq!(json["email"], "ana2@example.com");
    }

    #[tokio::test]
    async fn clear_all_removes_profile() {
        let state = AppState::fake();
        let (_, token) = signed_in(&state).await;

        let (status, _) = call(&state, "DELETE", &token, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&state, "GET", &token, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
