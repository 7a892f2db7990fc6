//! Health check endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::core_state::HealthStatus;

/// `GET /api/health`: unauthenticated liveness probe.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthStatus>, ApiError> {
    Ok(Json(ctx.run(|core| Ok(core.health())).await?))
}
