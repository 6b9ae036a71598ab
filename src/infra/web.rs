use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use log::error;
use serde_json::json;

use crate::{domain::model::ObjectKey, infra::controller::Context};

pub fn router(context: Arc<Context>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/applications/:namespace/:name/reconcile", post(reconcile_application))
        .with_state(context)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Runs one pass outside the watch loop, e.g. after fixing a cluster-side
/// problem that produced no watch event.
async fn reconcile_application(
    State(context): State<Arc<Context>>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = ObjectKey::new(namespace, name);
    context
        .reconcile(&key)
        .await
        .map(|outcome| {
            Json(json!({
                "application": key.to_string(),
                "requeue": outcome.requeue,
                "requeueAfterSecs": outcome.requeue_after.map(|after| after.as_secs()),
            }))
        })
        .map_err(|e| {
            error!("Error during reconcile_application {} {:?}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Something went wrong: {e}"),
            )
        })
}
