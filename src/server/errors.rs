use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::errors::IssuerError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Issuer(#[from] IssuerError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Issuer(IssuerError::InvalidDays) => StatusCode::BAD_REQUEST,
            AppError::Issuer(IssuerError::UnknownKey | IssuerError::UnknownPayment(_)) => {
                StatusCode::NOT_FOUND
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Service failure: {self:?}");
        } else {
            tracing::debug!("Request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
