use anyhow::Context;
use serde::Deserialize;
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    /// Absent key is not fatal at startup; each analysis request reports it.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub openai: OpenAiConfig,
    pub storage: Option<StorageConfig>,
    /// Offset used to decide which calendar day a meal belongs to.
    pub utc_offset: UtcOffset,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = non_empty_var("DATABASE_URL");
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "calorias".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "calorias-users".into()),
            ttl_minutes: parsed_var("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: parsed_var("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };

        let defaults = OpenAiConfig::default();
        let openai = OpenAiConfig {
            api_key: non_empty_var("OPENAI_API_KEY"),
            base_url: non_empty_var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: non_empty_var("OPENAI_MODEL").unwrap_or(defaults.model),
            timeout_secs: parsed_var("OPENAI_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
        };

        let storage = match (
            non_empty_var("MINIO_ENDPOINT"),
            non_empty_var("MINIO_BUCKET"),
            non_empty_var("MINIO_ACCESS_KEY"),
            non_empty_var("MINIO_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => Some(StorageConfig {
                endpoint,
                bucket,
                access_key,
                secret_key,
            }),
            _ => None,
        };

        let offset_hours: i8 = parsed_var("APP_UTC_OFFSET_HOURS").unwrap_or(0);
        let utc_offset = UtcOffset::from_hms(offset_hours, 0, 0)
            .with_context(|| format!("APP_UTC_OFFSET_HOURS out of range: {}", offset_hours))?;

        Ok(Self {
            database_url,
            jwt,
            openai,
            storage,
            utc_offset,
        })
    }

    pub fn local_now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.utc_offset)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
