use xumm_key::{config::Config, domain::issuer::InMemoryIssuer, server::Server, telemetry};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Loaded configuration: {:?}", config);

    let issuer = InMemoryIssuer::new(&config.issuer.qr_base_url);

    let server = Server::new(issuer, &config.server).await?;
    server.run().await
}
