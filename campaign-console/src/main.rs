use campaign_console::config::get_configuration;
use campaign_console::services::{
    ConsoleMetrics, HttpIdentityProvider, IdentityProvider, RestRoleStore,
};
use campaign_console::session::{ProviderFactory, SessionRegistry};
use campaign_console::startup::build_router;
use campaign_console::AppState;
use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "campaign-console",
        &configuration.telemetry.log_level,
        configuration.telemetry.otlp_endpoint.as_deref(),
    );

    let metrics = ConsoleMetrics::new()?;

    let client = reqwest::Client::new();
    let provider_settings = configuration.identity_provider.clone();
    let providers: ProviderFactory = Arc::new(move || -> Arc<dyn IdentityProvider> {
        Arc::new(HttpIdentityProvider::with_client(
            client.clone(),
            provider_settings.clone(),
        ))
    });
    let role_store = Arc::new(RestRoleStore::new(configuration.role_store.clone()));
    let sessions = SessionRegistry::new(providers, role_store)
        .with_lookup_counter(metrics.role_lookups.clone());

    let idle_timeout = configuration.session.idle_timeout();
    let sweeper = sessions.clone();
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let expired = sweeper.sweep_idle(idle_timeout);
            if expired > 0 {
                info!(expired, remaining = sweeper.len(), "Expired idle browser sessions");
            }
        }
    });

    let app = build_router(
        AppState::new(sessions.clone(), metrics, configuration.routes.clone())
            .with_session_settings(configuration.session.clone()),
    );

    let address = configuration.server.address();
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting campaign-console on {}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!("Server error: {}", e);
            anyhow::anyhow!("Server error: {}", e)
        })?;

    sweep_task.abort();
    sessions.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
