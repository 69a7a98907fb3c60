use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::response::{ApiResponse, ErrorData};

#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected before any remote call.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Unique-constraint races, e.g. two creators of the same owner's cart.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("ORM error")]
    OrmError(DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => return AppError::Conflict(detail),
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                return AppError::Validation(format!("referenced record does not exist: {detail}"));
            }
            _ => {}
        }
        match err {
            DbErr::Conn(e) => AppError::RemoteUnavailable(e.to_string()),
            DbErr::ConnectionAcquire(e) => AppError::RemoteUnavailable(e.to_string()),
            other => AppError::OrmError(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RemoteUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        (status, axum::Json(ApiResponse::<ErrorData>::failure(self.to_string()))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_db_errors_stay_orm_errors() {
        let err: AppError = DbErr::RecordNotFound("cart".into()).into();
        assert!(matches!(err, AppError::OrmError(_)));
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        let resp = AppError::validation("quantity must be greater than 0").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = AppError::Conflict("carts_user_id_key".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let resp = AppError::RemoteUnavailable("timeout".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
