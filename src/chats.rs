use crate::error::PollError;
use crate::polls::parse_id;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

pub async fn list_chats(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<String>,
) -> Result<impl IntoResponse, PollError> {
    let poll_id = parse_id(&poll_id)?;
    let chats = app_state.store.list_chats(poll_id).await?;
    Ok((StatusCode::OK, Json(chats)))
}

pub async fn delete_chats(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<String>,
) -> Result<impl IntoResponse, PollError> {
    let poll_id = parse_id(&poll_id)?;
    let deleted = app_state.store.delete_chat(poll_id).await?;
    Ok((StatusCode::OK, Json(json!({ "deleted": deleted }))))
}
