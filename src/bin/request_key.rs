use std::sync::Arc;

use color_eyre::eyre::eyre;
use xumm_key::{
    client::HttpKeyClient,
    config::Config,
    domain::{
        models::{KeyOutcome, PaymentRequestParams},
        poller::PollerConfig,
        requester::ApiKeyRequester,
    },
    telemetry,
};

/// Requests an API key with the `request.*` settings and waits for the outcome.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::load()?;
    let client = HttpKeyClient::new(&config.api.base_url, config.api.timeout())?;
    let mut requester =
        ApiKeyRequester::new(Arc::new(client), PollerConfig::from(&config.poll));

    let params = PaymentRequestParams::from(&config.request);
    let info = requester.request_key(params).await?;

    println!("Scan to pay: {}", info.qr_code_url);
    println!("Waiting for payment {} ...", info.payment_id);

    let state = tokio::select! {
        state = requester.wait_for_outcome() => state,
        _ = tokio::signal::ctrl_c() => {
            return Err(eyre!("Interrupted before the key was issued"));
        }
    };

    match state.outcome {
        Some(KeyOutcome::Issued { key, expiration }) => {
            println!("API key: {key}");
            println!("Expires: {expiration}");
            Ok(())
        }
        Some(KeyOutcome::Rejected) => Err(eyre!("Key request was rejected")),
        Some(KeyOutcome::Pending) | None => Err(eyre!(
            "Key request did not complete: {}",
            state.error.unwrap_or_else(|| "no outcome".to_string())
        )),
    }
}
