use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use picker_models::LedgerError;
use picker_services::AnalysisError;
use serde_json::json;
use tracing::error;

/// Any failed request. Always rendered as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::DuplicateId(_) | LedgerError::AlreadyRecorded(_) => StatusCode::CONFLICT,
            LedgerError::Invalid(_) => StatusCode::BAD_REQUEST,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let status = match &err {
            AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Conflict { .. } => StatusCode::CONFLICT,
            AnalysisError::Provider { .. } | AnalysisError::Normalization(_) => StatusCode::BAD_GATEWAY,
            AnalysisError::AnalysisUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Ledger(inner) => return inner.clone().into(),
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), format!("Invalid JSON in request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Invalid query string: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picker_models::{FactorKind, ModelError, TeamId};
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AnalysisError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                AnalysisError::Provider {
                    factor: FactorKind::Stats,
                    team: TeamId::new("KC"),
                    reason: "down".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                AnalysisError::AnalysisUnavailable {
                    attempts: 2,
                    reason: "timeout".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AnalysisError::Ledger(LedgerError::DuplicateId(Uuid::nil())),
                StatusCode::CONFLICT,
            ),
            (
                AnalysisError::Ledger(LedgerError::Storage("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_ledger_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(ApiError::from(LedgerError::NotFound(id)).status, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(LedgerError::AlreadyRecorded(id)).status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(LedgerError::Invalid(ModelError::InvalidOutcome("x".into()))).status,
            StatusCode::BAD_REQUEST
        );
    }
}
