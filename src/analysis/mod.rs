//! Meal photo analysis: one port, one contract.
//!
//! [`FoodAnalyzer`] is the only way the rest of the crate asks for a
//! nutrition estimate. The production implementation talks to an
//! OpenAI-compatible vision endpoint ([`openai::OpenAiVisionAnalyzer`]).

mod error;
pub mod handlers;
pub mod openai;
pub mod parse;
pub mod prompt;
#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::AnalysisError;

pub const DEFAULT_DESCRIPTION: &str = "Refeição analisada";
pub const DEFAULT_PORTIONS: &str = "Porção estimada";
pub const DEFAULT_SOURCES: &str = "Fontes: Google Nutrition, Tabela TACO, USDA";
pub const DEFAULT_MEAL_TYPE: &str = "refeição";

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Data URI or http(s) URL of the photo.
    pub image_url: String,
    pub meal_type: Option<String>,
}

impl AnalysisRequest {
    pub fn meal_type_label(&self) -> &str {
        self.meal_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_MEAL_TYPE)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "alta")]
    High,
    #[default]
    #[serde(rename = "média")]
    Medium,
    #[serde(rename = "baixa")]
    Low,
}

impl Confidence {
    /// Lenient parse of the label the model returned. Unknown labels fall
    /// back to medium.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "alta" | "high" => Self::High,
            "baixa" | "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "alta",
            Self::Medium => "média",
            Self::Low => "baixa",
        }
    }
}

/// Normalized estimate, the 200 body of the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionEstimate {
    pub calories: u32,
    pub description: String,
    pub foods: Vec<String>,
    pub portions: String,
    pub confidence: Confidence,
    pub sources: String,
}

#[async_trait]
pub trait FoodAnalyzer: Send + Sync {
    async fn analyze(&self, req: AnalysisRequest) -> Result<NutritionEstimate, AnalysisError>;
}
