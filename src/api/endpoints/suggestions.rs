//! Rule and risk suggestion endpoints.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::documents::parse_id;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Principal;
use crate::core_state::DocumentSuggestions;
use crate::models::enums::DocumentStatus;
use crate::pipeline::batch::BatchSummary;
use crate::pipeline::suggestion::SuggestionReport;

#[derive(Deserialize, Default)]
pub struct SuggestRequest {
    /// Replace records a human has edited.
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Deserialize, Default)]
pub struct BatchRequest {
    /// Eligible statuses (`draft`, `inReview`, ...). Empty means every document.
    #[serde(default)]
    pub statuses: Vec<String>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// `POST /api/documents/:id/suggestions`
pub async fn suggest(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Option<Json<SuggestRequest>>,
) -> Result<Json<SuggestionReport>, ApiError> {
    let id = parse_id(&id)?;
    let overwrite = payload.map(|Json(p)| p.overwrite).unwrap_or(false);
    Ok(Json(
        ctx.run(move |core| core.suggest_entities(&id, overwrite, &principal))
            .await?,
    ))
}

/// `GET /api/documents/:id/suggestions`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<DocumentSuggestions>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(ctx.run(move |core| core.list_suggestions(&id, &principal)).await?))
}

/// `POST /api/batch/suggestions`: runs to completion before responding.
pub async fn run_batch(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    payload: Option<Json<BatchRequest>>,
) -> Result<Json<BatchSummary>, ApiError> {
    let Json(request) = payload.unwrap_or_default();
    let statuses = request
        .statuses
        .iter()
        .map(|s| {
            DocumentStatus::parse_loose(s)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown document status: {s}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(
        ctx.run(move |core| core.run_batch_suggestion(statuses, &principal, None))
            .await?,
    ))
}

/// `POST /api/batch/suggestions/cancel`
pub async fn cancel_batch(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = ctx.run(move |core| core.cancel_batch(&principal)).await?;
    Ok(Json(CancelResponse { cancelled }))
}
