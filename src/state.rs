use std::sync::Arc;

use anyhow::Context;

use crate::analysis::openai::OpenAiVisionAnalyzer;
use crate::analysis::FoodAnalyzer;
use crate::config::AppConfig;
use crate::storage::{PhotoArchive, S3PhotoArchive};
use crate::store::{MemoryStore, PgStore, TrackerStore};
use crate::tracker::Tracker;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TrackerStore>,
    pub analyzer: Arc<dyn FoodAnalyzer>,
    pub tracker: Arc<Tracker>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn TrackerStore> = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?),
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let analyzer = Arc::new(
            OpenAiVisionAnalyzer::new(config.openai.clone()).context("build analysis client")?,
        ) as Arc<dyn FoodAnalyzer>;

        let photos = match &config.storage {
            Some(cfg) => Some(Arc::new(S3PhotoArchive::connect(cfg).await?) as Arc<dyn PhotoArchive>),
            None => None,
        };

        Ok(Self::from_parts(config, store, analyzer, photos))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn TrackerStore>,
        analyzer: Arc<dyn FoodAnalyzer>,
        photos: Option<Arc<dyn PhotoArchive>>,
    ) -> Self {
        let tracker = Arc::new(Tracker::new(store.clone(), analyzer.clone(), photos));
        Self {
            config,
            store,
            analyzer,
            tracker,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::analysis::stub::{sample_estimate, StubAnalyzer};
        Self::fake_with_analyzer(Arc::new(StubAnalyzer::returning(sample_estimate())))
    }

    #[cfg(test)]
    pub fn fake_with_analyzer(analyzer: Arc<dyn FoodAnalyzer>) -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            openai: Default::default(),
            storage: None,
            utc_offset: time::UtcOffset::UTC,
        });
        Self::from_parts(config, Arc::new(MemoryStore::new()), analyzer, None)
    }
}

/// Store a sample profile and return its id with a valid access token.
#[cfg(test)]
pub(crate) async fn signed_in(state: &AppState) -> (uuid::Uuid, String) {
    use crate::auth::services::{JwtKeys, TokenKind};
    use axum::extract::FromRef;

    let profile = crate::profile::model::sample_profile();
    state.store.insert_profile(&profile).await.unwrap();
    let token = JwtKeys::from_ref(state)
        .issue(profile.id, TokenKind::Access)
        .unwrap();
    (profile.id, token)
}
