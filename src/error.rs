use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::{face::FaceError, PunchError, ScheduleError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),
}

impl From<ScheduleError> for AppError {
    fn from(e: ScheduleError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<PunchError> for AppError {
    fn from(e: PunchError) -> Self {
        match e {
            PunchError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            PunchError::TooEarly { .. } | PunchError::OutOfOrder(_) => AppError::Validation(e.to_string()),
        }
    }
}

impl From<FaceError> for AppError {
    fn from(e: FaceError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PunchKind, PunchState};

    #[test]
    fn test_domain_errors_map_to_statuses() {
        let conflict: AppError = PunchError::InvalidTransition {
            state: PunchState::Off,
            kind: PunchKind::ClockOut,
        }
        .into();
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let early: AppError = PunchError::TooEarly { minutes_early: 40, allowed: 15 }.into();
        assert_eq!(early.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let schedule: AppError = ScheduleError::DuplicateDay(2).into();
        assert_eq!(schedule.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
