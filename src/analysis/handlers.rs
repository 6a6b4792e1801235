use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::{AnalysisError, AnalysisRequest, NutritionEstimate};
use crate::capture::{self, CapturedImage};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::AppState;

/// `{ image, mealType? }`, where `image` is a data URI or an http(s) URL.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeFoodRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub meal_type: Option<String>,
}

impl AnalyzeFoodRequest {
    /// A missing or blank image is reported before anything else is checked.
    pub fn capture(&self) -> Result<CapturedImage, ApiError> {
        let image = self
            .image
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AnalysisError::MissingImage)?;
        Ok(capture::from_reference(image)?)
    }
}

/// Unauthenticated, stateless proxy used by the web client.
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/analyze-food", post(analyze_food))
}

#[instrument(skip(state, payload))]
pub async fn analyze_food(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<AnalyzeFoodRequest>,
) -> Result<Json<NutritionEstimate>, ApiError> {
    let image = payload.capture().map_err(|e| {
        warn!(error = %e, "rejected analysis input");
        e
    })?;

    let req = AnalysisRequest {
        image_url: image.url,
        meal_type: payload.meal_type,
    };
    let estimate = state.analyzer.analyze(req).await?;
    info!(
        calories = estimate.calories,
        confidence = estimate.confidence.as_str(),
        "meal analyzed"
    );
    Ok(Json(estimate))
}
