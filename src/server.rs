pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use color_eyre::eyre::{Context, Result};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::domain::ports::KeyIssuer;
use handlers::health::health_check;
use handlers::xumm::{payment_status, request_payment, webhook};

#[derive(Debug, Clone)]
pub struct AppState<S: KeyIssuer> {
    pub issuer: Arc<S>,
}

/// HTTP server exposing the key issuance endpoints.
pub struct Server {
    router: Router,
    listener: TcpListener,
    port: u16,
}

impl Server {
    /// Binds the listener. Use port 0 to let the OS pick one.
    pub async fn new<S: KeyIssuer>(issuer: S, config: &ServerConfig) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

        let state = AppState {
            issuer: Arc::new(issuer),
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/api/xumm", get(request_payment::<S>))
            .route("/api/xumm/webhook", post(webhook::<S>))
            .route("/api/xumm/{payment_id}", get(payment_status::<S>))
            .layer(cors_layer)
            .layer(trace_layer)
            .with_state(state);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Binding TCP listener on {addr}"))?;
        let port = listener
            .local_addr()
            .context("Getting local address")?
            .port();

        Ok(Self {
            router,
            listener,
            port,
        })
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router)
            .await
            .context("Running HTTP server")
    }
}
