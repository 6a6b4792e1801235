use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{AnalysisError, AnalysisRequest, Confidence, FoodAnalyzer, NutritionEstimate};

pub(crate) fn sample_estimate() -> NutritionEstimate {
    NutritionEstimate {
        calories: 650,
        description: "Arroz, feijão e frango grelhado".into(),
        foods: vec!["arroz".into(), "feijão".into(), "frango".into()],
        portions: "1 prato".into(),
        confidence: Confidence::High,
        sources: "Tabela TACO".into(),
    }
}

/// Canned analyzer. `gated` holds every call until the gate is notified.
#[derive(Default)]
pub(crate) struct StubAnalyzer {
    estimate: Option<NutritionEstimate>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl StubAnalyzer {
    pub fn returning(estimate: NutritionEstimate) -> Self {
        Self {
            estimate: Some(estimate),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn gated(estimate: NutritionEstimate, gate: Arc<Notify>) -> Self {
        Self {
            estimate: Some(estimate),
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FoodAnalyzer for StubAnalyzer {
    async fn analyze(&self, _req: AnalysisRequest) -> Result<NutritionEstimate, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.estimate
            .clone()
            .ok_or_else(|| AnalysisError::IncompleteResult { raw: "{}".into() })
    }
}
