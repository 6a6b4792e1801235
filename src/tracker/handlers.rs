use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    CancelResponse, ConfirmRequest, ConfirmedMeal, NewActivity, PendingResponse, UploadQuery,
    WaterRequest,
};
use super::model::{Activity, DailySummary, Meal};
use crate::analysis::handlers::AnalyzeFoodRequest;
use crate::auth::services::AuthUser;
use crate::capture;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::state::AppState;

pub fn meal_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/:id", get(get_meal))
        .route("/meals/:id/photo", get(get_meal_photo))
        .route("/meals/analyze", post(analyze_json))
        .route("/meals/analyze/upload", post(analyze_upload))
        .route("/meals/analysis/cancel", post(cancel_analysis))
        .route("/meals/confirm", post(confirm_meal))
}

pub fn day_routes() -> Router<AppState> {
    Router::new()
        .route("/summary", get(get_summary))
        .route("/summary/reset", post(reset_summary))
        .route("/water", post(add_water))
        .route("/activities", get(list_activities).post(log_activity))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Meal>>, ApiError> {
    let today = state.config.local_now().date();
    Ok(Json(state.tracker.meals(user_id, today).await?))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Meal>, ApiError> {
    state
        .tracker
        .meal(user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Refeição não encontrada".into()))
}

/// 302 to a short-lived link to the archived photo.
#[instrument(skip(state))]
pub async fn get_meal_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> Result<Redirect, ApiError> {
    match state.tracker.photo_url(user_id, id).await? {
        Some(url) => Ok(Redirect::temporary(&url)),
        None => Err(ApiError::NotFound("Foto não encontrada".into())),
    }
}

/// POST /meals/analyze { image, mealType? }
#[instrument(skip(state, payload))]
pub async fn analyze_json(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<AnalyzeFoodRequest>,
) -> Result<Json<PendingResponse>, ApiError> {
    let image = payload.capture()?;
    let pending = state
        .tracker
        .analyze(user_id, image, payload.meal_type)
        .await?;
    Ok(Json(pending.into()))
}

/// POST /meals/analyze/upload?mealType=..., body is the photo itself.
#[instrument(skip(state, headers, body))]
pub async fn analyze_upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    QueryParams(query): QueryParams<UploadQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<PendingResponse>, ApiError> {
    let body = body?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let image = capture::from_bytes(body, content_type)?;
    let pending = state
        .tracker
        .analyze(user_id, image, query.meal_type)
        .await?;
    Ok(Json(pending.into()))
}

#[instrument(skip(state))]
pub async fn cancel_analysis(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.tracker.cancel(user_id),
    })
}

#[instrument(skip(state))]
pub async fn confirm_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<ConfirmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = state.config.local_now();
    let (meal, summary) = state.tracker.confirm(user_id, payload.ticket, now).await?;
    let location = format!("/api/v1/meals/{}", meal.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ConfirmedMeal { meal, summary }),
    ))
}

#[instrument(skip(state))]
pub async fn get_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<DailySummary>, ApiError> {
    let today = state.config.local_now().date();
    Ok(Json(state.tracker.summary(user_id, today).await?))
}

#[instrument(skip(state))]
pub async fn reset_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<DailySummary>, ApiError> {
    let today = state.config.local_now().date();
    Ok(Json(state.tracker.reset_day(user_id, today).await?))
}

#[instrument(skip(state))]
pub async fn add_water(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<WaterRequest>,
) -> Result<Json<DailySummary>, ApiError> {
    let today = state.config.local_now().date();
    Ok(Json(
        state
            .tracker
            .add_water(user_id, today, payload.amount_ml)
            .await?,
    ))
}

#[instrument(skip(state))]
pub async fn list_activities(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Activity>>, ApiError> {
    let today = state.config.local_now().date();
    Ok(Json(state.tracker.activities(user_id, today).await?))
}

#[instrument(skip(state))]
pub async fn log_activity(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<NewActivity>,
) -> Result<(StatusCode, Json<Activity>), ApiError> {
    let now = state.config.local_now();
    let activity = state.tracker.log_activity(user_id, payload, now).await?;
    Ok((StatusCode::CREATED, Json(activity)))
}
