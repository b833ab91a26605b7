use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use super::model::{parse_date, Author, Media, Memory};
use super::upload::MemoryForm;
use crate::error::{ApiError, ApiResult};
use crate::server::api::AppState;

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidId)
}

fn parse_author(raw: &str) -> ApiResult<Author> {
    raw.parse().map_err(ApiError::BadRequest)
}

fn parse_form_date(raw: &str) -> ApiResult<chrono::DateTime<Utc>> {
    parse_date(raw).ok_or_else(|| ApiError::Validation(vec![format!("Invalid date: {raw}")]))
}

/// Remove a file no stored row points at. Failures only leave an orphan
/// behind, so they are logged.
async fn discard_media(state: &AppState, id: Uuid, media: &Media) {
    if let Err(err) = state.media.destroy(media).await {
        tracing::warn!(%id, public_id = %media.public_id, error = %err, "failed to delete media");
    }
}

/// POST /api/memories
pub async fn create_memory(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let form = MemoryForm::from_multipart(multipart, state.config.media.max_upload_bytes).await?;
    tracing::info!(
        title = ?form.title,
        created_by = ?form.created_by,
        file = ?form.file.as_ref().map(|f| (&f.file_name, &f.content_type)),
        "creating memory"
    );

    let (Some(title), Some(message), Some(date), Some(created_by)) =
        (&form.title, &form.message, &form.date, &form.created_by)
    else {
        let missing = form.missing_required();
        tracing::warn!(?missing, "memory rejected");
        return Err(ApiError::BadRequest(format!(
            "Title, message, date, and createdBy are required. Missing: {}",
            missing.join(", ")
        )));
    };
    let created_by = parse_author(created_by)?;
    let date = parse_form_date(date)?;
    let mut memory = Memory::new(title, message, date, created_by).map_err(ApiError::Validation)?;

    if let Some(file) = &form.file {
        memory.media = Some(state.media.upload(file).await?);
    }

    state.db.insert_memory(&memory)?;
    tracing::info!(id = %memory.id, "memory saved");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Memory created successfully",
            "data": memory,
        })),
    ))
}

/// GET /api/memories
pub async fn list_memories(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let memories = state.db.list_memories()?;

    Ok(Json(json!({
        "success": true,
        "count": memories.len(),
        "data": memories,
    })))
}

/// GET /api/memories/{id}
pub async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let memory = state.db.get_memory(id)?.ok_or(ApiError::NotFound)?;

    Ok(Json(json!({ "success": true, "data": memory })))
}

/// PUT /api/memories/{id}
///
/// Blank fields are left as they were. A new file replaces the old
/// attachment; `removeMedia=true` drops it.
pub async fn update_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let form = MemoryForm::from_multipart(multipart, state.config.media.max_upload_bytes).await?;

    let created_by = form.created_by.as_deref().map(parse_author).transpose()?;
    let date = form.date.as_deref().map(parse_form_date).transpose()?;

    let mut memory = state.db.get_memory(id)?.ok_or(ApiError::NotFound)?;
    if let Some(title) = &form.title {
        memory.title = title.trim().to_string();
    }
    if let Some(message) = &form.message {
        memory.message = message.clone();
    }
    if let Some(date) = date {
        memory.date = date;
    }
    if let Some(created_by) = created_by {
        memory.created_by = created_by;
    }
    memory.validate().map_err(ApiError::Validation)?;

    let previous = memory.media.clone();
    if let Some(file) = &form.file {
        memory.media = Some(state.media.upload(file).await?);
    } else if form.remove_media {
        memory.media = None;
    }

    // The row only moves to the new attachment once it is stored; the old
    // one is removed after that.
    memory.updated_at = Utc::now();
    let stored = state.db.update_memory(&memory);
    if !matches!(stored, Ok(true)) {
        if form.file.is_some() {
            if let Some(fresh) = &memory.media {
                discard_media(&state, memory.id, fresh).await;
            }
        }
        return Err(match stored {
            Err(err) => err.into(),
            Ok(_) => ApiError::NotFound,
        });
    }
    if form.file.is_some() || form.remove_media {
        if let Some(old) = &previous {
            discard_media(&state, memory.id, old).await;
        }
    }
    tracing::info!(id = %memory.id, "memory updated");

    Ok(Json(json!({
        "success": true,
        "message": "Memory updated successfully",
        "data": memory,
    })))
}

/// DELETE /api/memories/{id}
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let memory = state.db.delete_memory(id)?.ok_or(ApiError::NotFound)?;

    if let Some(media) = &memory.media {
        discard_media(&state, memory.id, media).await;
    }
    tracing::info!(id = %memory.id, "memory deleted");

    Ok(Json(json!({
        "success": true,
        "message": "Memory deleted successfully",
    })))
}
