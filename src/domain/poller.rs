use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::errors::{ApiError, ApiResult};
use super::models::{KeyOutcome, RequestState};
use super::ports::KeyIssuanceApi;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Configuration for status polling
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between two status queries, must not be zero
    pub interval: Duration,
    /// Give up after this many queries. `None` polls until a terminal status.
    pub max_attempts: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

impl PollerConfig {
    pub fn validate(&self) -> ApiResult<()> {
        if self.interval.is_zero() {
            return Err(ApiError::InvalidParams(
                "poll interval must not be zero".to_string(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(ApiError::InvalidParams(
                "max poll attempts must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

/// Background task polling the issuance status of one payment request.
///
/// The task is aborted when the poller is cancelled or dropped. If it stops
/// for any other reason before a terminal status, an error is recorded.
#[derive(Debug)]
pub struct StatusPoller {
    payment_id: String,
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    /// Spawns the polling task. The first query fires one interval after spawning.
    pub fn spawn(
        api: Arc<dyn KeyIssuanceApi>,
        payment_id: String,
        config: PollerConfig,
        state: Arc<watch::Sender<RequestState>>,
    ) -> Self {
        debug!(
            payment_id = %payment_id,
            "Starting status poller with interval of {:?}", config.interval
        );

        let cancelled = Arc::new(AtomicBool::new(false));
        let guard = ExitGuard {
            state: Arc::clone(&state),
            payment_id: payment_id.clone(),
            cancelled: Arc::clone(&cancelled),
        };
        let task_id = payment_id.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            run(api, task_id, config, state).await;
        });

        Self {
            payment_id,
            cancelled,
            handle,
        }
    }

    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if !self.handle.is_finished() {
            debug!(payment_id = %self.payment_id, "Cancelling status poller");
            self.handle.abort();
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.handle.abort();
    }
}

/// Records an error when the polling task ends without settling, e.g. on panic.
struct ExitGuard {
    state: Arc<watch::Sender<RequestState>>,
    payment_id: String,
    cancelled: Arc<AtomicBool>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.cancelled.load(Ordering::SeqCst)
            || self.state.borrow().payment_id.as_deref() != Some(self.payment_id.as_str())
        {
            return;
        }
        settle(&self.state, &self.payment_id, |s| {
            if !s.is_settled() {
                warn!("Status poller stopped before the payment was resolved");
                s.error = Some("status polling stopped unexpectedly".to_string());
            }
        });
    }
}

async fn run(
    api: Arc<dyn KeyIssuanceApi>,
    payment_id: String,
    config: PollerConfig,
    state: Arc<watch::Sender<RequestState>>,
) {
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts: u32 = 0;

    loop {
        ticker.tick().await;
        attempts = attempts.saturating_add(1);

        match api.payment_status(&payment_id).await {
            Ok(KeyOutcome::Pending) => {
                debug!(payment_id = %payment_id, attempts, "Key issuance still pending");
            }
            Ok(outcome) => {
                info!(
                    payment_id = %payment_id,
                    attempts,
                    rejected = matches!(outcome, KeyOutcome::Rejected),
                    "Key issuance resolved"
                );
                settle(&state, &payment_id, |s| s.outcome = Some(outcome));
                return;
            }
            Err(e) => {
                warn!(payment_id = %payment_id, "Status query failed: {}", e);
            }
        }

        if let Some(max) = config.max_attempts
            && attempts >= max
        {
            warn!(payment_id = %payment_id, "Giving up after {} status queries", attempts);
            settle(&state, &payment_id, |s| {
                s.error = Some(format!("status polling gave up after {attempts} attempts"));
            });
            return;
        }
    }
}

/// Applies a terminal update, unless the state already moved on to another payment.
fn settle(
    state: &watch::Sender<RequestState>,
    payment_id: &str,
    update: impl FnOnce(&mut RequestState),
) {
    let applied = state.send_if_modified(|s| {
        if s.payment_id.as_deref() != Some(payment_id) {
            return false;
        }
        update(s);
        s.payment_id = None;
        true
    });

    if !applied {
        debug!(payment_id = %payment_id, "Dropping result of a superseded payment request");
    }
}
