use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{ActivityKind, DailySummary, Meal};
use super::slot::PendingAnalysis;
use crate::analysis::NutritionEstimate;

/// `?mealType=` on the raw upload route.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    pub meal_type: Option<String>,
}

/// Estimate waiting for confirmation, with the ticket to confirm it by.
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub ticket: Uuid,
    #[serde(flatten)]
    pub estimate: NutritionEstimate,
}

impl From<PendingAnalysis> for PendingResponse {
    fn from(p: PendingAnalysis) -> Self {
        Self {
            ticket: p.ticket,
            estimate: p.estimate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub ticket: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConfirmedMeal {
    pub meal: Meal,
    pub summary: DailySummary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterRequest {
    /// Signed so that zero and negative amounts reach validation.
    pub amount_ml: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    pub kind: ActivityKind,
    pub duration_minutes: u32,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub calories_burned: u32,
}
