use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::State,
        middleware,
        response::IntoResponse,
        routing::{get, post},
    },
    ferrygram_config::FerrygramConfig,
    ferrygram_plugins::{PluginInstaller, PluginStore, StoreSpecLoader, bundled},
    ferrygram_runtime::{ConfigFileSource, RuntimeHost},
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{error, info, warn},
};

use crate::{auth_middleware::require_admin, plugin_routes, runtime_routes, state::GatewayState};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the admin router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app_state = AppState { gateway: state };

    let admin = Router::new()
        .route("/runtime/reload", post(runtime_routes::reload))
        .route("/runtime/status", get(runtime_routes::status))
        .route(
            "/plugins",
            get(plugin_routes::list).post(plugin_routes::create),
        )
        .route("/plugins/install", post(plugin_routes::install))
        .route(
            "/plugins/{id}",
            get(plugin_routes::get)
                .patch(plugin_routes::patch)
                .delete(plugin_routes::delete),
        )
        .route("/plugins/{id}/upgrade", post(plugin_routes::upgrade))
        .route("/plugins/{id}/rollback", post(plugin_routes::rollback))
        .route("/plugins/{id}/uninstall", post(plugin_routes::uninstall))
        .route("/plugins/{id}/reload", post(plugin_routes::reload))
        .route("/plugins/{id}/versions", get(plugin_routes::versions))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_admin,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the plugin runtime and serve the admin API until ctrl-c.
///
/// The runtime is stopped after the server drains.
pub async fn start_gateway(config: FerrygramConfig) -> anyhow::Result<()> {
    let store = Arc::new(PluginStore::new(config.plugins.resolved_store()));
    let installer = Arc::new(PluginInstaller::new(
        Arc::clone(&store),
        config.plugins.resolved_dir(),
    ));
    let settings = Arc::new(ConfigFileSource::new(None, config.clone()));
    let host = RuntimeHost::builder(settings)
        .spec_loader(Arc::new(StoreSpecLoader::new(store, bundled::catalog())))
        .build();

    match host.start(None).await {
        Ok(report) if report.enabled => info!(
            loaded = ?report.loaded,
            failed = report.failed.len(),
            "plugin runtime started"
        ),
        Ok(_) => info!("plugin runtime disabled by configuration"),
        Err(e) => error!(error = %e, "plugin runtime failed to start"),
    }

    if config.auth.token().is_none() {
        warn!("no admin token configured, admin api will reject every request");
    }
    let state = Arc::new(GatewayState::new(
        host.clone(),
        installer,
        config.auth.admin_token.clone(),
    ));
    let app = build_gateway_app(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    info!(addr = %listener.local_addr()?, "admin api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    host.stop().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
        "phase": state.gateway.host.phase(),
        "contextActive": state.gateway.host.context_active(),
    }))
}
