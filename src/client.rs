use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::domain::errors::{ApiError, ApiResult, redacted};
use crate::domain::models::{ApiKey, KeyOutcome, PaymentRequestInformation, PaymentRequestParams};
use crate::domain::ports::KeyIssuanceApi;

const PAYMENT_PATH: &str = "api/xumm";

/// HTTP client for the key issuance endpoints.
#[derive(Debug, Clone)]
pub struct HttpKeyClient {
    client: Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpKeyClient {
    /// Creates a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration) -> ApiResult<Self> {
        Self::with_client(Client::new(), base_url, request_timeout)
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        request_timeout: Duration,
    ) -> ApiResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        // Without a trailing slash `join` would replace the last path segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the initiation endpoint for `params`.
    pub fn payment_request_url(&self, params: &PaymentRequestParams) -> ApiResult<Url> {
        let mut url = self.endpoint(PAYMENT_PATH)?;
        url.query_pairs_mut().extend_pairs(params.query_pairs());
        Ok(url)
    }

    /// URL of the status endpoint for `payment_id`.
    pub fn payment_status_url(&self, payment_id: &str) -> ApiResult<Url> {
        self.endpoint(&format!(
            "{PAYMENT_PATH}/{}",
            urlencoding::encode(payment_id)
        ))
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ApiResult<T> {
        debug!("GET {}", redacted(&url));

        // reqwest errors print the full URL, query included
        let request = self.client.get(url.clone()).send();
        let response = match timeout(self.request_timeout, request).await {
            Ok(result) => result.map_err(reqwest::Error::without_url)?,
            Err(_) => return Err(ApiError::Timeout),
        };

        if !response.status().is_success() {
            return Err(ApiError::status(response.status(), &url));
        }

        match timeout(self.request_timeout, response.json::<T>()).await {
            Ok(result) => Ok(result.map_err(reqwest::Error::without_url)?),
            Err(_) => Err(ApiError::Timeout),
        }
    }
}

#[async_trait]
impl KeyIssuanceApi for HttpKeyClient {
    async fn request_payment(
        &self,
        params: &PaymentRequestParams,
    ) -> ApiResult<PaymentRequestInformation> {
        let url = self.payment_request_url(params)?;
        let info: PaymentRequestInformation = self.get_json(url).await?;

        info!(payment_id = %info.payment_id, "Received payment request");
        Ok(info)
    }

    async fn payment_status(&self, payment_id: &str) -> ApiResult<KeyOutcome> {
        let url = self.payment_status_url(payment_id)?;
        let api_key: ApiKey = self.get_json(url).await?;
        Ok(api_key.into())
    }
}
