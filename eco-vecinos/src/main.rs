use dotenvy::dotenv;
use eco_vecinos::config::{get_configuration, BackendProvider, Settings};
use eco_vecinos::models::{Profile, Role};
use eco_vecinos::services::backend::{
    AppwriteBackend, AuthChange, DocumentStore, IdentityProvider, InMemoryBackend,
};
use eco_vecinos::services::{AuthGateway, SessionRegistry};
use eco_vecinos::startup::build_router;
use eco_vecinos::AppState;
use secrecy::ExposeSecret;
use service_core::observability::{init_metrics, init_tracing};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

type Backends = (
    Arc<dyn IdentityProvider>,
    Arc<dyn DocumentStore>,
    Option<broadcast::Receiver<AuthChange>>,
);

async fn build_backend(settings: &Settings) -> anyhow::Result<Backends> {
    match settings.backend.provider {
        BackendProvider::Memory => {
            let backend = Arc::new(InMemoryBackend::new());

            if let Some(seed) = &settings.backend.memory.seed_admin {
                let profile = Profile {
                    id: String::new(),
                    name: seed.name.clone(),
                    email: seed.email.clone(),
                    phone: String::new(),
                    role: Some(Role::SuperAdmin),
                    community_id: None,
                    unit: String::new(),
                    linked_owner_id: None,
                    created_at: None,
                };
                backend
                    .seed_user(&seed.email, seed.password.expose_secret(), profile)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to seed admin account: {}", e))?;
                info!(email = %seed.email, "Seeded administrator account");
            }

            let changes = backend.subscribe();
            let identity: Arc<dyn IdentityProvider> = backend.clone();
            let documents: Arc<dyn DocumentStore> = backend;
            Ok((identity, documents, changes))
        }
        BackendProvider::Appwrite => {
            let appwrite = settings.backend.appwrite.clone().ok_or_else(|| {
                anyhow::anyhow!("backend.provider is appwrite but backend.appwrite is missing")
            })?;
            let backend = Arc::new(AppwriteBackend::new(appwrite));
            let changes = backend.subscribe();
            let identity: Arc<dyn IdentityProvider> = backend.clone();
            let documents: Arc<dyn DocumentStore> = backend;
            Ok((identity, documents, changes))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    let telemetry = &configuration.telemetry;
    init_tracing(
        &telemetry.service_name,
        &telemetry.log_level,
        telemetry.otlp_endpoint.as_deref(),
    )?;

    let prometheus = init_metrics()?;

    let (identity, documents, changes) = build_backend(&configuration).await?;
    info!(provider = ?configuration.backend.provider, "Backend ready");

    let sessions = Arc::new(SessionRegistry::new());
    if let Some(changes) = changes {
        sessions.clone().spawn_listener(changes);
    }
    let idle_hours = configuration.server.session_idle_hours.max(1).unsigned_abs();
    sessions
        .clone()
        .spawn_sweeper(Duration::from_secs(idle_hours * 3600));

    let gateway = Arc::new(AuthGateway::new(identity, documents.clone()));
    let state = AppState::new(
        gateway,
        sessions,
        documents,
        &configuration.meetings.video_base_url,
    )
    .with_metrics(prometheus);

    let app = build_router(state, &configuration.server);

    let address = format!(
        "{}:{}",
        configuration.server.host, configuration.server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting eco-vecinos on {}", address);

    axum::serve(listener, app).await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
