use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::IssuerError;
use super::models::{KeyOutcome, PaymentRequestInformation, PaymentRequestParams, WebHook};
use super::ports::KeyIssuer;

pub const DEFAULT_QR_BASE_URL: &str = "https://xumm.app/sign";
/// Longest validity a single payment request may buy.
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
struct PendingPayment {
    days: u32,
    renew_key: Option<String>,
}

/// Key issuer keeping payment requests, statuses and issued keys in memory.
///
/// Resolved statuses and issued keys are never evicted, so memory grows with
/// the number of payments served for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct InMemoryIssuer {
    qr_base_url: Arc<str>,
    pending: Arc<DashMap<String, PendingPayment>>,
    statuses: Arc<DashMap<String, KeyOutcome>>,
    keys: Arc<DashMap<String, DateTime<Utc>>>,
}

impl Default for InMemoryIssuer {
    fn default() -> Self {
        Self::new(DEFAULT_QR_BASE_URL)
    }
}

impl InMemoryIssuer {
    pub fn new(qr_base_url: impl AsRef<str>) -> Self {
        Self {
            qr_base_url: Arc::from(qr_base_url.as_ref().trim_end_matches('/')),
            pending: Arc::new(DashMap::new()),
            statuses: Arc::new(DashMap::new()),
            keys: Arc::new(DashMap::new()),
        }
    }

    /// Expiration of an issued key, if the key is known.
    pub fn key_expiration(&self, key: &str) -> Option<DateTime<Utc>> {
        self.keys.get(key).map(|entry| *entry.value())
    }

    fn issue(&self, payment: PendingPayment) -> Result<KeyOutcome, IssuerError> {
        let now = Utc::now();
        let validity = validity(payment.days)?;

        let (key, expiration) = match payment.renew_key {
            Some(key) => {
                let mut entry = self.keys.entry(key.clone()).or_insert(now);
                let expiration = (*entry)
                    .max(now)
                    .checked_add_signed(validity)
                    .ok_or(IssuerError::InvalidDays)?;
                *entry = expiration;
                (key, expiration)
            }
            None => {
                let expiration = now
                    .checked_add_signed(validity)
                    .ok_or(IssuerError::InvalidDays)?;
                let key = Uuid::new_v4().simple().to_string().to_uppercase();
                self.keys.insert(key.clone(), expiration);
                (key, expiration)
            }
        };

        Ok(KeyOutcome::Issued {
            key,
            expiration: expiration.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

fn validity(days: u32) -> Result<Duration, IssuerError> {
    if days == 0 || days > MAX_VALIDITY_DAYS {
        return Err(IssuerError::InvalidDays);
    }
    Duration::try_days(i64::from(days)).ok_or(IssuerError::InvalidDays)
}

impl KeyIssuer for InMemoryIssuer {
    fn request_payment(
        &self,
        params: PaymentRequestParams,
    ) -> Result<PaymentRequestInformation, IssuerError> {
        let validity = validity(params.days)?;
        let now = Utc::now();
        let start = match &params.renew_key {
            Some(key) => match self.key_expiration(key) {
                Some(expiration) => expiration.max(now),
                None => {
                    warn!("Renewal requested for an unknown key");
                    return Err(IssuerError::UnknownKey);
                }
            },
            None => now,
        };
        if start.checked_add_signed(validity).is_none() {
            return Err(IssuerError::InvalidDays);
        }

        let payment_id = Uuid::new_v4().to_string();
        let qr_code_url = format!("{}/{payment_id}_q.png", self.qr_base_url);

        info!(
            payment_id = %payment_id,
            days = params.days,
            renewal = params.is_renewal(),
            "Created payment request"
        );

        self.pending.insert(
            payment_id.clone(),
            PendingPayment {
                days: params.days,
                renew_key: params.renew_key,
            },
        );

        Ok(PaymentRequestInformation {
            payment_id,
            qr_code_url,
        })
    }

    fn payment_status(&self, payment_id: &str) -> KeyOutcome {
        self.statuses
            .get(payment_id)
            .map(|entry| entry.value().clone())
            .unwrap_or(KeyOutcome::Pending)
    }

    fn update_payment_status(&self, webhook: &WebHook) -> Result<KeyOutcome, IssuerError> {
        let id = &webhook.payload_response.payload_uuidv4;

        let Some((_, payment)) = self.pending.remove(id) else {
            // Signing platforms may deliver the same notification twice
            if let Some(existing) = self.statuses.get(id) {
                debug!(payment_id = %id, "Payment already resolved");
                return Ok(existing.value().clone());
            }
            return Err(IssuerError::UnknownPayment(id.clone()));
        };

        let outcome = if webhook.payload_response.signed == Some(true) {
            // A key that cannot be issued must still end the payment
            self.issue(payment).unwrap_or_else(|e| {
                warn!(payment_id = %id, "Cannot issue key: {}", e);
                KeyOutcome::Rejected
            })
        } else {
            KeyOutcome::Rejected
        };

        info!(payment_id = %id, status = outcome_kind(&outcome), "Payment resolved");
        self.statuses.insert(id.clone(), outcome.clone());
        Ok(outcome)
    }
}

fn outcome_kind(outcome: &KeyOutcome) -> &'static str {
    match outcome {
        KeyOutcome::Pending => "pending",
        KeyOutcome::Rejected => "rejected",
        KeyOutcome::Issued { .. } => "issued",
    }
}
