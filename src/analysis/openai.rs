use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, instrument, warn};

use super::{parse, prompt, AnalysisError, AnalysisRequest, FoodAnalyzer, NutritionEstimate};
use crate::config::OpenAiConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Analyzer backed by an OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiVisionAnalyzer {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiVisionAnalyzer {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        if config.api_key.is_none() {
            warn!("OPENAI_API_KEY not set; meal analysis requests will fail");
        }
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

fn classify(status: StatusCode, body: &str) -> AnalysisError {
    let message = parse::upstream_error_message(body);
    match status {
        StatusCode::UNAUTHORIZED => AnalysisError::Unauthorized {
            detail: message.unwrap_or_else(|| "invalid api key".into()),
        },
        StatusCode::TOO_MANY_REQUESTS => AnalysisError::RateLimited {
            detail: message.unwrap_or_else(|| "quota exceeded".into()),
        },
        _ => AnalysisError::Upstream {
            status: status.as_u16(),
            message: message
                .unwrap_or_else(|| "unknown error while processing the image".into()),
        },
    }
}

#[async_trait]
impl FoodAnalyzer for OpenAiVisionAnalyzer {
    #[instrument(skip(self, req), fields(meal_type = %req.meal_type_label()))]
    async fn analyze(&self, req: AnalysisRequest) -> Result<NutritionEstimate, AnalysisError> {
        if req.image_url.trim().is_empty() {
            return Err(AnalysisError::MissingImage);
        }
        let Some(api_key) = self.config.api_key.as_deref() else {
            error!("OPENAI_API_KEY missing; refusing analysis request");
            return Err(AnalysisError::NotConfigured);
        };

        let body = prompt::build_request(&self.config.model, &req);
        info!(model = %self.config.model, "sending image to vision model");

        let res = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "vision request failed");
                AnalysisError::Transport(e)
            })?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            let err = classify(status, &text);
            error!(%status, error = %err, "vision model returned an error");
            return Err(err);
        }

        let content = parse::extract_content(&text).map_err(|e| {
            error!(body = %text, "unexpected chat completion envelope");
            e
        })?;
        debug!(preview = %content.chars().take(200).collect::<String>(), "model reply");

        match parse::normalize(&content) {
            Ok(estimate) => {
                info!(
                    calories = estimate.calories,
                    foods = estimate.foods.len(),
                    confidence = estimate.confidence.as_str(),
                    "analysis complete"
                );
                Ok(estimate)
            }
            Err(e) => {
                warn!(error = %e, raw = %content, "model reply rejected");
                Err(e)
            }
        }
    }
}
