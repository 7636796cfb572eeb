//! Stats Routes
//!
//! Row count of the telemetry table.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info};

use super::live_trend_routes::ErrorResponse;
use crate::db;

const STATS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub row_count: i64,
}

/// Create the stats route over a database pool
pub fn stats_routes(pool: PgPool) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .with_state(pool)
}

async fn stats_handler(
    State(pool): State<PgPool>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    match db::row_count(&pool, STATS_QUERY_TIMEOUT).await {
        Ok(row_count) => {
            info!(rows = row_count, "stats retrieved");
            Ok(Json(StatsResponse { row_count }))
        }
        Err(e) => {
            error!(error = %e, "failed to fetch stats");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to fetch stats".to_string(),
                }),
            ))
        }
    }
}
