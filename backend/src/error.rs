use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::services::{DomainError, ErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn validation_message(e: &validator::ValidationErrors) -> String {
    e.field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let msgs: Vec<&str> = errors
                .iter()
                .filter_map(|err| err.message.as_ref().map(|m| m.as_ref()))
                .collect();
            if msgs.is_empty() {
                let codes: Vec<&str> = errors.iter().map(|err| err.code.as_ref()).collect();
                format!("{}: {}", field, codes.join(", "))
            } else {
                format!("{}: {}", field, msgs.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn domain_status(e: &DomainError) -> StatusCode {
    match e.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ExternalFailure => match e {
            DomainError::FaceMismatch { .. } => StatusCode::UNAUTHORIZED,
            DomainError::FaceNotRegistered => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        },
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", validation_message(e)),
            AppError::Domain(e) => {
                let status = domain_status(e);
                if status.is_server_error() {
                    tracing::error!("Request failed: {:?}", e);
                }
                let message = if e.kind() == ErrorKind::Internal {
                    "Internal server error".to_string()
                } else {
                    e.to_string()
                };
                (status, e.code(), message)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::days::Days;
    use crate::store::StoreError;

    fn status_of(e: DomainError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(status_of(DomainError::PastDate), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(DomainError::AlreadyPunchedIn), StatusCode::CONFLICT);
        assert_eq!(status_of(DomainError::NotOwner), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(DomainError::InsufficientBalance { available: Days::whole(1), requested: Days::whole(2) }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(DomainError::FaceMismatch { confidence: 40 }), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(DomainError::FaceNotRegistered), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(DomainError::External("down".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(DomainError::Store(StoreError::Corrupt("bad row".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
