//! Document, version and workflow endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::Principal;
use crate::models::{AccessControl, Document, Version};
use crate::versioning::NewContent;

/// Maximum decoded upload size (25 MB).
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Deserialize)]
pub struct UploadRequest {
    /// Absent for a new document.
    pub document_id: Option<Uuid>,
    pub file_name: String,
    pub media_type: Option<String>,
    /// Base64 file content, optionally as a data URL.
    pub content: String,
    pub change_description: Option<String>,
    /// Only honoured when creating a document.
    pub access_control: Option<AccessControl>,
}

#[derive(Deserialize)]
pub struct SetCurrentRequest {
    pub version_id: Uuid,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// `POST /api/documents`: create a document or add a version to one.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<UploadRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let bytes = decode_content(&payload.content)
        .map_err(|e| ApiError::BadRequest(format!("Invalid content encoding: {e}")))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::BadRequest(format!(
            "Upload exceeds {MAX_UPLOAD_BYTES} bytes ({} bytes)",
            bytes.len()
        )));
    }

    let status = if payload.document_id.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let content = NewContent {
        file_name: payload.file_name,
        media_type: payload.media_type,
        bytes,
        change_description: payload.change_description,
    };
    let document_id = payload.document_id;
    let access_control = payload.access_control;

    let document = ctx
        .run(move |core| core.upload_version(document_id, content, &principal, access_control))
        .await?;
    Ok((status, Json(document)))
}

/// `GET /api/documents`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(ctx.run(move |core| core.list_documents(&principal)).await?))
}

/// `GET /api/documents/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(ctx.run(move |core| core.get_document(&id, &principal)).await?))
}

/// `DELETE /api/documents/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    ctx.run(move |core| core.delete_document(&id, &principal)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/documents/:id/versions`: newest first.
pub async fn versions(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Version>>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(ctx.run(move |core| core.list_versions(&id, &principal)).await?))
}

/// `PUT /api/documents/:id/current-version`
pub async fn set_current(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<SetCurrentRequest>,
) -> Result<Json<Document>, ApiError> {
    let id = parse_id(&id)?;
    let version_id = payload.version_id;
    Ok(Json(
        ctx.run(move |core| core.set_current_version(&id, &version_id, &principal))
            .await?,
    ))
}

/// `POST /api/documents/:id/status`
pub async fn change_status(
    State(ctx): State<ApiContext>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Document>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(
        ctx.run(move |core| core.change_status(&id, &payload.status, &principal))
            .await?,
    ))
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid document id: {raw}")))
}

/// Decode plain base64 or a `data:<mime>;base64,<payload>` URL.
fn decode_content(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match raw.find(";base64,") {
        Some(pos) if raw.starts_with("data:") => &raw[pos + ";base64,".len()..],
        _ => raw,
    };
    base64::engine::general_purpose::STANDARD.decode(payload.trim())
}
