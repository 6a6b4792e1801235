use axum::{
    extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::analysis::AnalysisError;
use crate::auth::services::AuthError;
use crate::capture::CaptureError;
use crate::profile::model::ProfileError;
use crate::tracker::{SlotError, TrackerError};

/// Error body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(rename = "rawContent", skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// The request itself could not be read: body, path or query.
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::Slot(e) => Self::Slot(e),
            TrackerError::ProfileMissing => Self::Unauthorized("Usuário não encontrado".into()),
            TrackerError::Invalid(m) => Self::BadRequest(m),
            TrackerError::Analysis(e) => Self::Analysis(e),
            TrackerError::Store(e) => Self::Internal(e),
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(e: ProfileError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Unauthorized(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let (status, code, message) = match &rejection {
            JsonRejection::MissingJsonContentType(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                "Envie o corpo como application/json.",
            ),
            JsonRejection::BytesRejection(_) => (
                rejection.status(),
                "invalid_body",
                "Não foi possível ler o corpo da requisição.",
            ),
            _ => (StatusCode::BAD_REQUEST, "invalid_body", "Corpo JSON inválido."),
        };
        Self::rejected(status, code, message, rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::rejected(
            rejection.status(),
            "invalid_body",
            "Não foi possível ler o corpo da requisição.",
            rejection.body_text(),
        )
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::rejected(
            StatusCode::BAD_REQUEST,
            "invalid_path",
            "Parâmetro de rota inválido.",
            rejection.body_text(),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::rejected(
            StatusCode::BAD_REQUEST,
            "invalid_query",
            "Parâmetros de consulta inválidos.",
            rejection.body_text(),
        )
    }
}

impl ApiError {
    fn rejected(status: StatusCode, code: &'static str, message: &str, detail: String) -> Self {
        warn!(%status, %detail, "request rejected");
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::Rejected {
                status,
                code: "body_too_large",
                message: "O corpo da requisição excede o limite permitido.".into(),
            };
        }
        Self::Rejected {
            status,
            code,
            message: message.into(),
        }
    }

    fn parts(&self) -> (StatusCode, ErrorBody) {
        let body = |error, message: String| ErrorBody {
            error,
            message,
            raw_content: None,
        };
        match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, body("bad_request", m.clone())),
            Self::Unauthorized(m) => (StatusCode::UNAUTHORIZED, body("unauthorized", m.clone())),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, body("not_found", m.clone())),
            Self::Conflict(m) => (StatusCode::CONFLICT, body("conflict", m.clone())),
            Self::Rejected {
                status,
                code,
                message,
            } => (*status, body(*code, message.clone())),
            Self::Capture(e) => {
                let (status, code) = match e {
                    CaptureError::Empty => (StatusCode::BAD_REQUEST, "image_missing"),
                    CaptureError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "image_too_large"),
                    CaptureError::UnsupportedType(_) | CaptureError::InvalidEncoding => {
                        (StatusCode::BAD_REQUEST, "image_invalid")
                    }
                };
                (status, body(code, e.to_string()))
            }
            Self::Analysis(e) => (
                e.status(),
                ErrorBody {
                    error: e.code(),
                    message: e.user_message(),
                    raw_content: e.raw_content().map(str::to_string),
                },
            ),
            Self::Slot(e) => {
                let (status, code) = match e {
                    SlotError::Busy => (StatusCode::CONFLICT, "analysis_in_progress"),
                    SlotError::Stale => (StatusCode::CONFLICT, "analysis_stale"),
                    SlotError::NoPending => (StatusCode::NOT_FOUND, "no_pending_analysis"),
                };
                (status, body(code, e.to_string()))
            }
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                body("internal", "Erro interno, tente novamente.".into()),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!(error = ?e, "internal error");
        }
        let (status, body) = self.parts();
        (status, Json(body)).into_response()
    }
}
