use std::sync::Arc;

use splunk_itsi_mcp::{
    build_app, config::Config, logging, splunk_client::SplunkConnectorProvider, AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    logging::init_logging();

    let config = Config::from_env()?;

    let provider = Arc::new(SplunkConnectorProvider::new(config.splunk.clone()));
    let bind_socket = config.bind_socket()?;
    let state = AppState::new(config.api_token.clone(), provider);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        splunk_url = %config.splunk.base_url,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
