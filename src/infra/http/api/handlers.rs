use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use mixboard_api_types::CreatePlaylistRequest;
use tracing::info;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::provider::search_playlists;

use super::error::ApiError;
use super::models::{
    ListQuery, SearchQuery, detail_response, draft_from_request, external_response,
    playlist_list_response, playlist_response, search_response,
};
use super::state::ApiState;

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|err| ApiError::bad_request("Invalid playlist id", Some(err.to_string())))
}

pub async fn create_playlist(
    State(state): State<ApiState>,
    Json(payload): Json<CreatePlaylistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.catalog.create(draft_from_request(payload)).await?;

    state.scheduler.register_known(entry.id);
    let refreshed = state.session.catalog_changed();
    info!(
        target = "mixboard::http::api",
        id = %entry.id,
        refreshed,
        "playlist submitted"
    );

    Ok((StatusCode::CREATED, Json(playlist_response(&entry))))
}

pub async fn list_playlists(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(0) as usize;
    let entries = state.session.fetch_list(limit).await?;
    Ok(Json(playlist_list_response(&entries)))
}

pub async fn get_playlist(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let entry = state.session.fetch_entry(id).await?;
    Ok(Json(playlist_response(&entry)))
}

pub async fn get_playlist_detail(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let detail = state.session.playlist_detail(id, None).await?;
    Ok(Json(detail_response(&detail)))
}

pub async fn upvote_playlist(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let entry = state.catalog.upvote(id).await?;
    state.session.entry_changed(id);
    Ok(Json(playlist_response(&entry)))
}

pub async fn get_external(
    State(state): State<ApiState>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.session.fetch_external(&external_id).await?;
    Ok(Json(external_response(&snapshot)))
}

pub async fn search(
    State(state): State<ApiState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = search_playlists(state.provider.as_ref(), &query.q, query.effective_limit())
        .await
        .map_err(AppError::from)?;
    Ok(Json(search_response(query.q.trim(), items)))
}
