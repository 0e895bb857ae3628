use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use sprintpilot::agent::profiles;
use sprintpilot::config::{ServerConfig, StoreMode};
use sprintpilot::model::ModelGateway;
use sprintpilot::ollama::OllamaProvider;
use sprintpilot::server::create_router;
use sprintpilot::store::{ConversationStore, HttpConversationStore, InMemoryConversationStore};
use sprintpilot::tools::{BackendClient, ToolRegistry};
use sprintpilot::tracing::{init_tracing, shutdown_tracing};
use sprintpilot::AgentRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    init_tracing("sprintpilot", config.otlp_endpoint.as_deref(), config.log_json)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))?;

    let profiles = profiles::builtin();

    let backend = BackendClient::new(&config.backend_url, config.request_timeout);
    let registry = ToolRegistry::with_backend(backend).context("failed to build tool registry")?;
    registry
        .validate_profiles(&profiles)
        .context("agent profile references a missing tool")?;

    let mut gateway = ModelGateway::new();
    gateway.register(
        Arc::new(OllamaProvider::new(config.ollama_url.clone())),
        config.models.iter().cloned(),
    );
    for profile in profiles.iter() {
        if !gateway.models().contains(&profile.default_model.as_str()) {
            warn!(
                role = %profile.role,
                model = %profile.default_model,
                "Default model is not in the catalog; requests for this role will fail"
            );
        }
    }

    let store: Arc<dyn ConversationStore> = match config.store {
        StoreMode::Backend => Arc::new(
            HttpConversationStore::new(&config.backend_url, config.request_timeout)
                .context("failed to build conversation store")?,
        ),
        StoreMode::Memory => {
            warn!("Using in-memory conversation store; conversations are lost on restart");
            Arc::new(InMemoryConversationStore::new())
        }
    };

    let runtime = Arc::new(AgentRuntime::new(profiles, gateway, registry, store));
    let app = create_router(runtime);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(
        addr = %config.bind_addr,
        backend = %config.backend_url,
        ollama = %config.ollama_url,
        models = ?config.models,
        "SprintPilot listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("server error")?;

    shutdown_tracing();
    Ok(())
}
