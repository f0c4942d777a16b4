use serde::{Deserialize, Serialize};

/// Status value reported while a payment has not been resolved yet.
pub const PENDING_SENTINEL: &str = "WAITING";
/// Status value reported when key issuance was denied.
pub const REJECTED_SENTINEL: &str = "REJECTED";

/// Parameters supplied by the caller before initiating a key request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestParams {
    /// Validity of the requested key, in days.
    pub days: u32,
    /// Existing key to extend. `Some` switches the request to renewal mode.
    pub renew_key: Option<String>,
}

impl PaymentRequestParams {
    pub fn new(days: u32) -> Self {
        Self {
            days,
            renew_key: None,
        }
    }

    /// Turns the request into a renewal of `key`.
    ///
    /// An empty key leaves the request in non-renewal mode.
    pub fn renewing(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.renew_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn is_renewal(&self) -> bool {
        self.renew_key.is_some()
    }

    /// Query pairs sent to the initiation endpoint, in wire order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("days", self.days.to_string())];
        if let Some(key) = &self.renew_key {
            pairs.push(("key", key.clone()));
        }
        pairs
    }
}

/// Answer of the initiation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequestInformation {
    /// Tracking identifier used for status polls.
    pub payment_id: String,
    /// Display code rendered as a scannable image.
    pub qr_code_url: String,
}

/// Wire shape of a status answer.
///
/// `key` doubles as the status: see [`KeyOutcome`] for the decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    #[serde(default)]
    pub expiration: Option<String>,
    pub key: String,
}

/// Decoded issuance status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Pending,
    Rejected,
    Issued { key: String, expiration: String },
}

impl KeyOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, KeyOutcome::Pending)
    }

    /// The `key` value as it travels on the wire.
    pub fn key(&self) -> &str {
        match self {
            KeyOutcome::Pending => PENDING_SENTINEL,
            KeyOutcome::Rejected => REJECTED_SENTINEL,
            KeyOutcome::Issued { key, .. } => key,
        }
    }

    pub fn expiration(&self) -> Option<&str> {
        match self {
            KeyOutcome::Issued { expiration, .. } => Some(expiration),
            _ => None,
        }
    }
}

impl From<ApiKey> for KeyOutcome {
    fn from(value: ApiKey) -> Self {
        match value.key.as_str() {
            PENDING_SENTINEL => KeyOutcome::Pending,
            REJECTED_SENTINEL => KeyOutcome::Rejected,
            _ => KeyOutcome::Issued {
                key: value.key,
                expiration: value.expiration.unwrap_or_default(),
            },
        }
    }
}

impl From<KeyOutcome> for ApiKey {
    fn from(value: KeyOutcome) -> Self {
        match value {
            KeyOutcome::Issued { key, expiration } => ApiKey {
                expiration: Some(expiration),
                key,
            },
            other => ApiKey {
                expiration: None,
                key: other.key().to_string(),
            },
        }
    }
}

/// Presentation state observed by whatever renders the requester.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    /// Tracking identifier of the payment currently being polled.
    pub payment_id: Option<String>,
    pub qr_code_url: Option<String>,
    /// Terminal outcome, once one has been observed.
    pub outcome: Option<KeyOutcome>,
    pub loading: bool,
    pub error: Option<String>,
}

impl RequestState {
    /// True once polling can no longer change the state.
    pub fn is_settled(&self) -> bool {
        self.outcome.is_some() || self.error.is_some()
    }
}

/// Notification posted by the signing platform once a payload is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebHook {
    pub payload_response: PayloadResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadResponse {
    pub payload_uuidv4: String,
    #[serde(default)]
    pub signed: Option<bool>,
}
