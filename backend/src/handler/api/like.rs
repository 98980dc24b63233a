use std::collections::HashMap;

use axum::{extract::State, routing, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::{
    error::{ResponseError, Result},
    format_err,
    state::AppState,
};

use super::method_not_allowed;

pub(super) fn create_router() -> Router<AppState> {
    Router::new().route(
        "/",
        routing::get(get_likes)
            .post(post_like)
            .fallback(method_not_allowed),
    )
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct PostLikeReq {
    haiku_id: String,
    user_id: String,
}

#[derive(Serialize, ToSchema)]
pub(super) struct PostLikeResp {
    success: bool,
    /// Like count after this like.
    likes: u64,
}

/// Records a like and mirrors the new count into the pin metadata.
///
/// The like table is authoritative. The metadata `likes` value is a cache
/// overwritten with the stored count, so a failed mirror heals on the next like.
#[utoipa::path(
    post,
    path = "/api/likes",
    request_body = PostLikeReq,
    responses(
        (status = 200, body = PostLikeResp),
        (status = 400, body = ResponseError),
        (status = 404, body = ResponseError),
        (status = 405, body = ResponseError),
        (status = 500, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state, req))]
pub(super) async fn post_like(
    State(state): State<AppState>,
    Json(req): Json<PostLikeReq>,
) -> Result<Json<PostLikeResp>> {
    if req.haiku_id.is_empty() || req.user_id.is_empty() {
        return Err(format_err!(BAD_REQUEST, "Haiku ID and user ID are required"));
    }
    tracing::info!(haiku_id = %req.haiku_id, user_id = %req.user_id, "liking haiku");

    // Only pinned haikus can be liked, so no like row outlives a missing pin.
    let mut keyvalues = state
        .pinning
        .pin_keyvalues(&req.haiku_id)
        .await
        .map_err(|e| e.context("Failed to like haiku"))?;

    let inserted = state
        .likes
        .insert_like(&req.haiku_id, &req.user_id)
        .await
        .map_err(|e| e.context("Failed to like haiku"))?;
    if !inserted {
        return Err(format_err!(BAD_REQUEST, "User has already liked this haiku"));
    }

    let likes = state
        .likes
        .count(&req.haiku_id)
        .await
        .map_err(|e| e.context("Failed to like haiku"))?;

    keyvalues.insert("likes".to_string(), json!(likes));
    state
        .pinning
        .update_keyvalues(&req.haiku_id, keyvalues)
        .await
        .map_err(|e| e.context("Failed to update haiku metadata"))?;

    Ok(Json(PostLikeResp {
        success: true,
        likes,
    }))
}

#[derive(Serialize, ToSchema)]
pub(super) struct GetLikesResp {
    /// Like count of every liked haiku, keyed by haiku CID.
    likes: HashMap<String, u64>,
}

#[utoipa::path(
    get,
    path = "/api/likes",
    responses(
        (status = 200, body = GetLikesResp),
        (status = 500, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state))]
pub(super) async fn get_likes(State(state): State<AppState>) -> Result<Json<GetLikesResp>> {
    let likes = state
        .likes
        .all_counts()
        .await
        .map_err(|e| e.context("Failed to fetch likes"))?;
    Ok(Json(GetLikesResp { likes }))
}
