//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use mapster_core::{DungeonMap, GridCell, MapDraft, MapId, MapMembership, UserId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

/// Run a storage-bound operation off the async executor.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> mapster_core::Result<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(state.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

fn require_name(draft: &MapDraft) -> Result<(), ApiError> {
    if draft.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be blank".to_string()));
    }
    Ok(())
}

/// List the requester's maps
pub async fn list_maps(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<DungeonMap>>, ApiError> {
    let maps = blocking(&state, move |s| s.maps.list_maps(user)).await?;
    Ok(Json(maps))
}

/// Create a map owned by the requester
pub async fn create_map(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(draft): Json<MapDraft>,
) -> Result<Json<DungeonMap>, ApiError> {
    require_name(&draft)?;
    let map = blocking(&state, move |s| s.maps.create_map(&draft, user)).await?;
    Ok(Json(map))
}

pub async fn get_map(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(map_id): Path<MapId>,
) -> Result<Json<DungeonMap>, ApiError> {
    let map = blocking(&state, move |s| s.maps.get_map(map_id, user)).await?;
    Ok(Json(map))
}

/// Look up a map by join code. Membership is not required.
pub async fn get_map_by_join_code(
    State(state): State<Arc<AppState>>,
    AuthUser(_): AuthUser,
    Path(code): Path<String>,
) -> Result<Json<DungeonMap>, ApiError> {
    let map = blocking(&state, move |s| s.maps.get_map_by_join_code(&code)).await?;
    Ok(Json(map))
}

pub async fn update_map(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(map_id): Path<MapId>,
    Json(draft): Json<MapDraft>,
) -> Result<Json<DungeonMap>, ApiError> {
    require_name(&draft)?;
    let map = blocking(&state, move |s| s.maps.update_map(map_id, user, &draft)).await?;
    Ok(Json(map))
}

pub async fn delete_map(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(map_id): Path<MapId>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |s| s.maps.delete_map(map_id, user)).await?;
    Ok(StatusCode::OK)
}

/// Request to join a map
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default)]
    pub join_code: Option<String>,
}

pub async fn join_map(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<JoinRequest>,
) -> Result<Json<DungeonMap>, ApiError> {
    let code = request
        .join_code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("joinCode is required".to_string()))?;
    let map = blocking(&state, move |s| s.maps.join_map(&code, user)).await?;
    Ok(Json(map))
}

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(map_id): Path<MapId>,
) -> Result<Json<Vec<MapMembership>>, ApiError> {
    let members = blocking(&state, move |s| s.maps.members(map_id, user)).await?;
    Ok(Json(members))
}

pub async fn promote_member(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((map_id, target)): Path<(MapId, UserId)>,
) -> Result<Json<MapMembership>, ApiError> {
    let membership =
        blocking(&state, move |s| s.maps.promote_to_dm(map_id, user, target)).await?;
    Ok(Json(membership))
}

pub async fn demote_member(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((map_id, target)): Path<(MapId, UserId)>,
) -> Result<Json<MapMembership>, ApiError> {
    let membership =
        blocking(&state, move |s| s.maps.demote_to_player(map_id, user, target)).await?;
    Ok(Json(membership))
}

/// Request to hand a map to another member
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub target_user_id: Option<UserId>,
}

pub async fn transfer_ownership(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(map_id): Path<MapId>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<MapMembership>, ApiError> {
    let target = request
        .target_user_id
        .ok_or_else(|| ApiError::BadRequest("targetUserId is required".to_string()))?;
    let membership =
        blocking(&state, move |s| s.maps.transfer_ownership(map_id, user, target)).await?;
    Ok(Json(membership))
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((map_id, target)): Path<(MapId, UserId)>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |s| s.maps.remove_member(map_id, user, target)).await?;
    Ok(StatusCode::OK)
}

pub async fn get_cell(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((map_id, row, col)): Path<(MapId, i32, i32)>,
) -> Result<Json<GridCell>, ApiError> {
    let cell = blocking(&state, move |s| s.cells.get_cell(map_id, user, row, col)).await?;
    Ok(Json(cell))
}

/// Cell annotation body
#[derive(Debug, Deserialize)]
pub struct CellRequest {
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn save_cell(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path((map_id, row, col)): Path<(MapId, i32, i32)>,
    Json(request): Json<CellRequest>,
) -> Result<Json<GridCell>, ApiError> {
    let cell = blocking(&state, move |s| {
        s.cells
            .save_cell(map_id, user, row, col, request.name.as_deref())
    })
    .await?;
    Ok(Json(cell))
}
