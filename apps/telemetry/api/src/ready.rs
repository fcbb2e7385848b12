//! `/ready`: readiness check over the configured stores

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use axum_helpers::{HealthCheckFuture, run_health_checks};
use database::postgres::{self, DatabaseConnection};
use serde_json::Value;

/// In-memory mode has nothing to check and is always ready.
pub fn router(db: Option<DatabaseConnection>) -> Router {
    Router::new()
        .route("/ready", get(ready_handler))
        .with_state(db)
}

async fn ready_handler(
    State(db): State<Option<DatabaseConnection>>,
) -> (StatusCode, Json<Value>) {
    let mut checks: Vec<(&str, HealthCheckFuture<'_>)> = Vec::new();
    if let Some(db) = &db {
        checks.push((
            "postgres",
            Box::pin(async move { postgres::check_health(db).await.map_err(|e| e.to_string()) }),
        ));
    }
    run_health_checks(checks).await
}
