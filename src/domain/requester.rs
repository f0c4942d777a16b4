use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, instrument};

use super::errors::{ApiError, ApiResult};
use super::models::{PaymentRequestInformation, PaymentRequestParams, RequestState};
use super::poller::{PollerConfig, StatusPoller};
use super::ports::KeyIssuanceApi;

/// How often `wait_for_outcome` checks whether the poller is still alive.
const FINISH_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Requests an API key and follows its issuance.
///
/// Owns at most one [`StatusPoller`]. Starting a new request, calling
/// [`cancel`](Self::cancel) or dropping the requester stops it.
pub struct ApiKeyRequester {
    api: Arc<dyn KeyIssuanceApi>,
    poller_config: PollerConfig,
    state: Arc<watch::Sender<RequestState>>,
    poller: Option<StatusPoller>,
}

impl ApiKeyRequester {
    pub fn new(api: Arc<dyn KeyIssuanceApi>, poller_config: PollerConfig) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            api,
            poller_config,
            state: Arc::new(state),
            poller: None,
        }
    }

    /// Snapshot of the presentation state.
    pub fn state(&self) -> RequestState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.state.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Initiates a payment request and starts polling its status.
    ///
    /// A failed initiation is not retried: the error is recorded in the state
    /// and returned, leaving the tracking identifier and the outcome unset.
    #[instrument(skip(self, params), fields(days = params.days, renewal = params.is_renewal()))]
    pub async fn request_key(
        &mut self,
        params: PaymentRequestParams,
    ) -> ApiResult<PaymentRequestInformation> {
        self.stop_poller();

        self.state.send_replace(RequestState {
            loading: true,
            ..RequestState::default()
        });

        if params.days == 0 {
            return Err(self.fail(ApiError::InvalidParams(
                "validity must be at least one day".to_string(),
            )));
        }
        if let Err(e) = self.poller_config.validate() {
            return Err(self.fail(e));
        }

        let info = match self.api.request_payment(&params).await {
            Ok(info) => info,
            Err(e) => return Err(self.fail(e)),
        };

        info!(payment_id = %info.payment_id, "Payment request created");

        self.state.send_modify(|s| {
            s.payment_id = Some(info.payment_id.clone());
            s.qr_code_url = Some(info.qr_code_url.clone());
            s.loading = false;
        });

        self.poller = Some(StatusPoller::spawn(
            Arc::clone(&self.api),
            info.payment_id.clone(),
            self.poller_config.clone(),
            Arc::clone(&self.state),
        ));

        Ok(info)
    }

    /// Stops polling. The display code and any recorded outcome are kept.
    pub fn cancel(&mut self) {
        self.stop_poller();
        self.state.send_if_modified(|s| {
            let changed = s.payment_id.is_some() || s.loading;
            s.payment_id = None;
            s.loading = false;
            changed
        });
    }

    /// Waits until an outcome or an error has been recorded.
    ///
    /// Returns the current state right away when nothing is being polled, and
    /// as soon as the poller has stopped without settling the state.
    pub async fn wait_for_outcome(&self) -> RequestState {
        let Some(poller) = &self.poller else {
            return self.state();
        };

        let mut rx = self.subscribe();
        loop {
            if rx.borrow_and_update().is_settled() || poller.is_finished() {
                return self.state();
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return self.state();
                    }
                }
                _ = tokio::time::sleep(FINISH_CHECK_INTERVAL) => {}
            }
        }
    }

    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
    }

    fn fail(&self, e: ApiError) -> ApiError {
        error!("Key request failed: {}", e);
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(e.to_string());
        });
        e
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use reqwest::{StatusCode, Url};

    use super::*;
    use crate::domain::models::KeyOutcome;

    const FAST: Duration = Duration::from_millis(5);

    /// Issuance API replaying scripted answers and recording calls.
    #[derive(Default)]
    struct ScriptedApi {
        fail_initiation: bool,
        fail_with_status: bool,
        statuses: Mutex<VecDeque<KeyOutcome>>,
        requests: Mutex<Vec<PaymentRequestParams>>,
        initiations: AtomicUsize,
        polls: AtomicUsize,
        polled_ids: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn with_statuses(statuses: impl IntoIterator<Item = KeyOutcome>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into_iter().collect()),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail_initiation: true,
                ..Self::default()
            }
        }

        /// Fails initiation the way the HTTP client reports a 404.
        fn failing_with_status() -> Self {
            Self {
                fail_with_status: true,
                ..Self::default()
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }

        fn polled_ids(&self) -> Vec<String> {
            self.polled_ids.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KeyIssuanceApi for ScriptedApi {
        async fn request_payment(
            &self,
            params: &PaymentRequestParams,
        ) -> ApiResult<PaymentRequestInformation> {
            self.requests.lock().unwrap().push(params.clone());
            let n = self.initiations.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_initiation {
                return Err(ApiError::Timeout);
            }
            if self.fail_with_status {
                let url = Url::parse("http://localhost:3000/api/xumm?days=1&key=SUPERSECRETKEY")
                    .unwrap();
                return Err(ApiError::status(StatusCode::NOT_FOUND, &url));
            }
            Ok(PaymentRequestInformation {
                payment_id: format!("p{n}"),
                qr_code_url: format!("u{n}"),
            })
        }

        async fn payment_status(&self, payment_id: &str) -> ApiResult<KeyOutcome> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.polled_ids.lock().unwrap().push(payment_id.to_string());
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(KeyOutcome::Pending))
        }
    }

    fn issued(key: &str) -> KeyOutcome {
        KeyOutcome::Issued {
            key: key.to_string(),
            expiration: "2027-01-01T00:00:00Z".to_string(),
        }
    }

    fn requester(api: &Arc<ScriptedApi>) -> ApiKeyRequester {
        let api: Arc<dyn KeyIssuanceApi> = api.clone();
        ApiKeyRequester::new(
            api,
            PollerConfig {
                interval: FAST,
                max_attempts: None,
            },
        )
    }

    #[tokio::test]
    async fn test_initiation_records_display_fields() {
        let api = Arc::new(ScriptedApi::default());
        let mut requester = requester(&api);

        let info = requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();

        assert_eq!(info.payment_id, "p1");
        let state = requester.state();
        assert_eq!(state.qr_code_url.as_deref(), Some("u1"));
        assert_eq!(state.payment_id.as_deref(), Some("p1"));
        assert!(!state.loading);
        assert!(state.outcome.is_none());
        assert!(requester.is_polling());
    }

    #[tokio::test]
    async fn test_initiation_forwards_request_shape() {
        let api = Arc::new(ScriptedApi::default());
        let mut requester = requester(&api);

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        requester
            .request_key(PaymentRequestParams::new(30).renewing("ABCD1234"))
            .await
            .unwrap();

        let requests = api.requests.lock().unwrap().clone();
        assert_eq!(requests[0].query_pairs(), vec![("days", "365".to_string())]);
        assert_eq!(
            requests[1].query_pairs(),
            vec![("days", "30".to_string()), ("key", "ABCD1234".to_string())]
        );
    }

    #[tokio::test]
    async fn test_issued_key_stops_polling() {
        let api = Arc::new(ScriptedApi::with_statuses([
            KeyOutcome::Pending,
            KeyOutcome::Pending,
            issued("ABCD1234"),
        ]));
        let mut requester = requester(&api);

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        let state = requester.wait_for_outcome().await;

        assert_eq!(state.outcome.as_ref().map(KeyOutcome::key), Some("ABCD1234"));
        assert!(state.payment_id.is_none());
        assert_eq!(api.polls(), 3);

        tokio::time::sleep(FAST * 10).await;
        assert_eq!(api.polls(), 3);
        assert!(!requester.is_polling());
    }

    #[tokio::test]
    async fn test_rejection_stops_polling() {
        let api = Arc::new(ScriptedApi::with_statuses([KeyOutcome::Rejected]));
        let mut requester = requester(&api);

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        let state = requester.wait_for_outcome().await;

        assert_eq!(state.outcome, Some(KeyOutcome::Rejected));
        assert_eq!(state.outcome.as_ref().map(KeyOutcome::key), Some("REJECTED"));

        tokio::time::sleep(FAST * 10).await;
        assert_eq!(api.polls(), 1);
    }

    #[tokio::test]
    async fn test_failed_initiation_leaves_result_unset() {
        let api = Arc::new(ScriptedApi::failing());
        let mut requester = requester(&api);

        let result = requester.request_key(PaymentRequestParams::new(365)).await;

        assert!(matches!(result, Err(ApiError::Timeout)));
        let state = requester.state();
        assert!(state.payment_id.is_none());
        assert!(state.outcome.is_none());
        assert!(!state.loading);
        assert!(state.error.is_some());
        assert!(!requester.is_polling());
        assert_eq!(api.polls(), 0);
    }

    #[tokio::test]
    async fn test_zero_days_skips_initiation() {
        let api = Arc::new(ScriptedApi::default());
        let mut requester = requester(&api);

        let result = requester.request_key(PaymentRequestParams::new(0)).await;

        assert!(matches!(result, Err(ApiError::InvalidParams(_))));
        assert_eq!(api.initiations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_new_request_replaces_previous_poller() {
        let api = Arc::new(ScriptedApi::default());
        let mut requester = requester(&api);

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        tokio::time::sleep(FAST * 4).await;
        assert!(api.polled_ids().iter().any(|id| id == "p1"));

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        let switched_at = api.polled_ids().len();

        tokio::time::sleep(FAST * 10).await;
        let later = api.polled_ids();
        assert!(later[switched_at..].iter().all(|id| id == "p2"));
        assert!(later[switched_at..].iter().any(|id| id == "p2"));

        let state = requester.state();
        assert_eq!(state.payment_id.as_deref(), Some("p2"));
        assert_eq!(state.qr_code_url.as_deref(), Some("u2"));
        assert!(requester.is_polling());
    }

    #[tokio::test]
    async fn test_invalid_poller_config_fails_before_initiation() {
        let invalid = [
            PollerConfig {
                interval: Duration::ZERO,
                max_attempts: None,
            },
            PollerConfig {
                interval: FAST,
                max_attempts: Some(0),
            },
        ];

        for config in invalid {
            let api = Arc::new(ScriptedApi::default());
            let dyn_api: Arc<dyn KeyIssuanceApi> = api.clone();
            let mut requester = ApiKeyRequester::new(dyn_api, config);

            let result = requester.request_key(PaymentRequestParams::new(365)).await;

            assert!(matches!(result, Err(ApiError::InvalidParams(_))));
            assert_eq!(api.initiations.load(Ordering::SeqCst), 0);
            let state = tokio::time::timeout(Duration::from_secs(1), requester.wait_for_outcome())
                .await
                .expect("wait_for_outcome must not hang");
            assert!(state.error.is_some());
            assert!(!state.loading);
            assert!(!requester.is_polling());
        }
    }

    #[tokio::test]
    async fn test_renewal_key_stays_out_of_errors() {
        let api = Arc::new(ScriptedApi::failing_with_status());
        let mut requester = requester(&api);

        let err = requester
            .request_key(PaymentRequestParams::new(1).renewing("SUPERSECRETKEY"))
            .await
            .unwrap_err();

        assert!(!err.to_string().contains("SUPERSECRETKEY"));
        let state = requester.state();
        assert!(!state.error.unwrap().contains("SUPERSECRETKEY"));
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let api = Arc::new(ScriptedApi::default());
        let mut requester = requester(&api);

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        tokio::time::sleep(FAST * 4).await;
        requester.cancel();
        tokio::time::sleep(FAST).await;
        let polls = api.polls();

        tokio::time::sleep(FAST * 10).await;
        assert_eq!(api.polls(), polls);
        assert!(requester.state().payment_id.is_none());
        assert_eq!(requester.state().qr_code_url.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_drop_stops_polling() {
        let api = Arc::new(ScriptedApi::default());
        let mut requester = requester(&api);

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        drop(requester);
        tokio::time::sleep(FAST).await;
        let polls = api.polls();

        tokio::time::sleep(FAST * 10).await;
        assert_eq!(api.polls(), polls);
    }

    #[tokio::test]
    async fn test_polling_gives_up_after_max_attempts() {
        let api = Arc::new(ScriptedApi::default());
        let dyn_api: Arc<dyn KeyIssuanceApi> = api.clone();
        let mut requester = ApiKeyRequester::new(
            dyn_api,
            PollerConfig {
                interval: FAST,
                max_attempts: Some(3),
            },
        );

        requester
            .request_key(PaymentRequestParams::new(365))
            .await
            .unwrap();
        let state = requester.wait_for_outcome().await;

        assert!(state.outcome.is_none());
        assert!(state.error.is_some());
        assert_eq!(api.polls(), 3);
    }
}
