use std::collections::HashMap;

use xumm_key::{config::Config, domain::issuer::InMemoryIssuer, server::Server, telemetry};

// Helper function to spawn a test server on a random port
pub async fn spawn_server(issuer: InMemoryIssuer) -> String {
    telemetry::init_tracing();

    let config = {
        let mut config = Config::load_with_sources(Some(HashMap::new())).unwrap();
        config.server.host = "127.0.0.1".to_string();
        // Use a random OS port
        config.server.port = 0;
        config
    };

    let server = Server::new(issuer, &config.server).await.unwrap();

    let port = server.port();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}
