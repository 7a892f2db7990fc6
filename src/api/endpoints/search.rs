//! Semantic search endpoint.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Principal;
use crate::pipeline::search::{DocumentHit, SearchQuery};

/// `POST /api/search`: documents the caller may view, best match first.
pub async fn search(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<Vec<DocumentHit>>, ApiError> {
    Ok(Json(ctx.run(move |core| core.search(&query, &principal)).await?))
}
