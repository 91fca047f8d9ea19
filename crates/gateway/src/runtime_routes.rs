use {
    axum::{body::Bytes, extract::State, response::IntoResponse},
    ferrygram_runtime::{FeatureStatus, RuntimeReport, StartOptions},
    serde::{Deserialize, Serialize},
    tracing::{error, info},
};

use crate::{
    api_response::{ApiError, ApiResult, parse_body, success},
    server::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReloadRequest {
    #[serde(default)]
    instances: Option<Vec<i64>>,
}

/// `POST /api/admin/runtime/reload`: stop the runtime and start it again.
///
/// Without `instances` the options of the previous start are reused.
pub async fn reload(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let request: ReloadRequest = parse_body(&body)?;
    let options = request.instances.map(StartOptions::with_instances);

    match state.gateway.host.reload(options).await {
        Ok(report) => {
            info!(
                loaded = report.loaded.len(),
                failed = report.failed.len(),
                "runtime reloaded via admin api"
            );
            Ok(success(report.as_ref()).into_response())
        },
        Err(e) => {
            error!(error = %e, "runtime reload failed");
            Err(ApiError::from(e))
        },
    }
}

/// The last report plus the features registered right now.
#[derive(Debug, Serialize)]
struct RuntimeStatus<'a> {
    #[serde(flatten)]
    report: &'a RuntimeReport,
    features: FeatureStatus,
}

/// `GET /api/admin/runtime/status`: the last completed report.
pub async fn status(State(state): State<AppState>) -> ApiResult {
    let host = &state.gateway.host;
    let report = host.last_report();
    let status = RuntimeStatus {
        report: report.as_ref(),
        features: host.feature_status(),
    };
    Ok(success(status).into_response())
}
