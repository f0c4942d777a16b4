use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::models::{ApiKey, PaymentRequestInformation, PaymentRequestParams, WebHook};
use crate::domain::ports::KeyIssuer;
use crate::server::{AppState, errors::AppError};

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub days: u32,
    #[serde(default)]
    pub key: Option<String>,
}

impl From<PaymentQuery> for PaymentRequestParams {
    fn from(value: PaymentQuery) -> Self {
        let params = PaymentRequestParams::new(value.days);
        match value.key {
            Some(key) => params.renewing(key),
            None => params,
        }
    }
}

/// `GET /api/xumm?days={n}[&key={existing}]`
#[instrument(skip_all)]
pub async fn request_payment<S: KeyIssuer>(
    State(state): State<AppState<S>>,
    Query(query): Query<PaymentQuery>,
) -> Result<Json<PaymentRequestInformation>, AppError> {
    debug!(days = query.days, renewal = query.key.is_some(), "Payment request received");
    let info = state.issuer.request_payment(query.into())?;
    Ok(Json(info))
}

/// `GET /api/xumm/{payment_id}`
pub async fn payment_status<S: KeyIssuer>(
    State(state): State<AppState<S>>,
    Path(payment_id): Path<String>,
) -> Json<ApiKey> {
    Json(state.issuer.payment_status(&payment_id).into())
}

/// `POST /api/xumm/webhook`
#[instrument(skip_all)]
pub async fn webhook<S: KeyIssuer>(
    State(state): State<AppState<S>>,
    Json(hook): Json<WebHook>,
) -> Result<StatusCode, AppError> {
    debug!(payment_id = %hook.payload_response.payload_uuidv4, "Webhook received");
    state.issuer.update_payment_status(&hook)?;
    Ok(StatusCode::OK)
}
