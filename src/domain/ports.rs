//! Interfaces between the domain and the outside world.

use async_trait::async_trait;

use super::errors::{ApiResult, IssuerError};
use super::models::{KeyOutcome, PaymentRequestInformation, PaymentRequestParams, WebHook};

/// Client side of the key issuance API.
#[async_trait]
pub trait KeyIssuanceApi: Send + Sync + 'static {
    /// Creates a payment request that, once signed, issues or renews a key.
    async fn request_payment(
        &self,
        params: &PaymentRequestParams,
    ) -> ApiResult<PaymentRequestInformation>;

    /// Queries the issuance status of a payment request.
    async fn payment_status(&self, payment_id: &str) -> ApiResult<KeyOutcome>;
}

/// Issuing side, served over HTTP by [`crate::server::Server`].
pub trait KeyIssuer: Clone + Send + Sync + 'static {
    fn request_payment(
        &self,
        params: PaymentRequestParams,
    ) -> Result<PaymentRequestInformation, IssuerError>;

    fn payment_status(&self, payment_id: &str) -> KeyOutcome;

    /// Resolves a payment request from a signing platform notification.
    fn update_payment_status(&self, webhook: &WebHook) -> Result<KeyOutcome, IssuerError>;
}
