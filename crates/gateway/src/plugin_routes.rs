//! Plugin inventory endpoints under `/api/admin/plugins`.
//!
//! These edit the persisted inventory only. The running host picks the
//! change up on its next start cycle, or right away when the request body
//! sets `reload: true`. `POST /plugins/{id}/reload` swaps a single plugin
//! in the running host without a full restart.

use std::{path::PathBuf, sync::Arc};

use {
    axum::{
        body::Bytes,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    ferrygram_plugins::{NewPlugin, PluginEntry, PluginPatch},
    ferrygram_runtime::RuntimeReport,
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use crate::{
    api_response::{ApiError, ApiResult, parse_body, success},
    server::AppState,
};

// ── Request bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    #[serde(flatten)]
    plugin: NewPlugin,
    #[serde(default)]
    reload: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatchRequest {
    #[serde(flatten)]
    patch: PluginPatch,
    #[serde(default)]
    reload: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallRequest {
    path: PathBuf,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    reload: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpgradeRequest {
    path: PathBuf,
    #[serde(default)]
    reload: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollbackRequest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    reload: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReloadFlag {
    #[serde(default)]
    reload: bool,
}

/// Result of a mutating call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PluginMutation {
    plugin: PluginEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<RuntimeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reload_error: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

pub async fn list(State(state): State<AppState>) -> ApiResult {
    let store = Arc::clone(state.gateway.store());
    let plugins = blocking(move || store.list()).await?;
    Ok(success(plugins).into_response())
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let store = Arc::clone(state.gateway.store());
    let plugin = blocking(move || store.get(&id)).await?;
    Ok(success(plugin).into_response())
}

pub async fn create(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let request: CreateRequest = parse_body(&body)?;
    let store = Arc::clone(state.gateway.store());
    let plugin = blocking(move || store.create(request.plugin)).await?;
    info!(plugin = %plugin.id, module = %plugin.module, "plugin created");
    Ok(finish(&state, StatusCode::CREATED, plugin, request.reload).await)
}

pub async fn patch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request: PatchRequest = parse_body(&body)?;
    if request.patch.is_empty() && !request.reload {
        return Err(ApiError::bad_request("nothing to update"));
    }
    let store = Arc::clone(state.gateway.store());
    let plugin = blocking(move || store.patch(&id, request.patch)).await?;
    info!(plugin = %plugin.id, enabled = plugin.enabled, "plugin updated");
    Ok(finish(&state, StatusCode::OK, plugin, request.reload).await)
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request: ReloadFlag = parse_body(&body)?;
    let store = Arc::clone(state.gateway.store());
    let plugin = blocking(move || store.delete(&id)).await?;
    info!(plugin = %plugin.id, "plugin deleted");
    Ok(finish(&state, StatusCode::OK, plugin, request.reload).await)
}

pub async fn install(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let request: InstallRequest = parse_body(&body)?;
    let installer = Arc::clone(&state.gateway.installer);
    let (path, enabled) = (request.path, request.enabled);
    let plugin = blocking(move || installer.install(&path, enabled)).await?;
    Ok(finish(&state, StatusCode::CREATED, plugin, request.reload).await)
}

pub async fn upgrade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request: UpgradeRequest = parse_body(&body)?;
    let installer = Arc::clone(&state.gateway.installer);
    let path = request.path;
    let plugin = blocking(move || installer.upgrade(&id, &path)).await?;
    Ok(finish(&state, StatusCode::OK, plugin, request.reload).await)
}

pub async fn rollback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request: RollbackRequest = parse_body(&body)?;
    let installer = Arc::clone(&state.gateway.installer);
    let version = request.version;
    let plugin = blocking(move || installer.rollback(&id, version.as_deref())).await?;
    Ok(finish(&state, StatusCode::OK, plugin, request.reload).await)
}

pub async fn uninstall(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let request: ReloadFlag = parse_body(&body)?;
    let installer = Arc::clone(&state.gateway.installer);
    let plugin = blocking(move || installer.uninstall(&id)).await?;
    Ok(finish(&state, StatusCode::OK, plugin, request.reload).await)
}

/// `POST /api/admin/plugins/{id}/reload`: rebuild one plugin from its
/// current inventory entry.
pub async fn reload(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let result = state.gateway.host.reload_plugin(&id).await?;
    let message = match (&result.error, result.loaded) {
        (Some(_), _) => "plugin failed to reload",
        (None, true) => "plugin reloaded",
        (None, false) => "plugin is disabled",
    };
    info!(plugin = %id, loaded = result.loaded, "plugin reload via admin api");
    Ok(success(result).with_message(message).into_response())
}

pub async fn versions(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let installer = Arc::clone(&state.gateway.installer);
    let versions = blocking(move || installer.versions(&id)).await?;
    Ok(success(versions).into_response())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Run a store or installer call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> ferrygram_plugins::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal("plugin store task failed").with_error(e))?
        .map_err(ApiError::from)
}

/// Reload the runtime when asked, then wrap the entry and report.
///
/// A failed reload doesn't undo the inventory change; the error is
/// returned next to the entry instead.
async fn finish(
    state: &AppState,
    status: StatusCode,
    plugin: PluginEntry,
    reload: bool,
) -> Response {
    let mut out = PluginMutation {
        plugin,
        report: None,
        reload_error: None,
    };
    if reload {
        match state.gateway.host.reload(None).await {
            Ok(report) => out.report = Some(report.as_ref().clone()),
            Err(e) => {
                warn!(plugin = %out.plugin.id, error = %e, "reload after plugin change failed");
                out.reload_error = Some(e.to_string());
            },
        }
    }
    (status, success(out)).into_response()
}
