use axum::http::StatusCode;
use thiserror::Error;

/// Terminal outcomes of one analysis attempt other than success.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("image not provided")]
    MissingImage,

    #[error("OPENAI_API_KEY is not configured")]
    NotConfigured,

    #[error("upstream rejected the API key: {detail}")]
    Unauthorized { detail: String },

    #[error("upstream rate limit exceeded: {detail}")]
    RateLimited { detail: String },

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream reply is not valid JSON")]
    MalformedResponse { raw: String },

    #[error("upstream reply has no numeric calories")]
    IncompleteResult { raw: String },
}

impl AnalysisError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingImage => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::NotConfigured
            | Self::Transport(_)
            | Self::MalformedResponse { .. }
            | Self::IncompleteResult { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-stable label for the `error` field of the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingImage => "image_missing",
            Self::NotConfigured => "analysis_not_configured",
            Self::Unauthorized { .. } => "upstream_unauthorized",
            Self::RateLimited { .. } => "upstream_rate_limited",
            Self::Upstream { .. } => "analysis_failed",
            Self::Transport(_) => "upstream_unreachable",
            Self::MalformedResponse { .. } => "malformed_ai_response",
            Self::IncompleteResult { .. } => "incomplete_analysis",
        }
    }

    /// What the user should read.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingImage => "Imagem não fornecida.".into(),
            Self::NotConfigured => {
                "A análise de refeições não está configurada no servidor. Configure a variável OPENAI_API_KEY."
                    .into()
            }
            Self::Unauthorized { .. } => {
                "A chave da API de IA está inválida ou expirada. Verifique a chave configurada.".into()
            }
            Self::RateLimited { .. } => {
                "O limite de requisições da API de IA foi atingido. Aguarde alguns minutos e tente novamente."
                    .into()
            }
            Self::Upstream { message, .. } => format!("Erro ao analisar imagem com IA: {}", message),
            Self::Transport(_) => {
                "Não foi possível contatar o serviço de IA. Verifique a conexão e tente novamente.".into()
            }
            Self::MalformedResponse { .. } => {
                "A IA retornou uma resposta em formato inesperado. Tente novamente com outra imagem."
                    .into()
            }
            Self::IncompleteResult { .. } => {
                "Não foi possível identificar as calorias na imagem. Tente com uma foto mais clara da refeição."
                    .into()
            }
        }
    }

    /// Upstream text retained for diagnostics.
    pub fn raw_content(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse { raw } | Self::IncompleteResult { raw } => Some(raw),
            _ => None,
        }
    }
}
