use axum::{
    extract::{self, State},
    routing, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{Context, ResponseError, Result},
    haiku::{
        fetch_haiku, fetch_image_map, load_haikus, sort_by_likes, sort_by_recent, split_tags,
        FetchFailure, Haiku, HAIKU_METADATA_NAME,
    },
    pinata::gateway_url,
    state::AppState,
};

use super::method_not_allowed;

pub(super) fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            routing::get(get_haikus)
                .post(post_haiku)
                .fallback(method_not_allowed),
        )
        .route("/search", routing::get(get_search_haikus))
        .route("/top", routing::get(get_top_haikus))
        .route("/user", routing::get(get_user_haikus))
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct GetHaikuResp {
    haiku: Haiku,
    /// Gateway host to build image URLs with.
    pinata_gateway: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct GetHaikusResp {
    haikus: Vec<Haiku>,
    pinata_gateway: String,
    /// Documents that could not be loaded and are missing from `haikus`.
    failures: Vec<FetchFailure>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct GetUserHaikusResp {
    haikus: Vec<Haiku>,
    pinata_gateway: String,
    display_name: String,
    failures: Vec<FetchFailure>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct GetHaikuQuery {
    /// CID of the haiku.
    #[serde(default)]
    id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/haiku",
    params(GetHaikuQuery),
    responses(
        (status = 200, body = GetHaikuResp),
        (status = 400, body = ResponseError),
        (status = 404, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state))]
pub(super) async fn get_haiku(
    State(state): State<AppState>,
    extract::Query(query): extract::Query<GetHaikuQuery>,
) -> Result<Json<GetHaikuResp>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .context_bad_request("Haiku ID is required")?;

    let image_map = fetch_image_map(&*state.pinning, &state.config.image_map_cid)
        .await
        .map_err(|e| e.context("Failed to fetch haiku"))?;
    let mut haiku = fetch_haiku(&*state.pinning, &id, &image_map)
        .await
        .map_err(|e| e.context("Failed to fetch haiku"))?;
    haiku.likes = state
        .likes
        .count(&id)
        .await
        .map_err(|e| e.context("Failed to fetch haiku"))?;

    Ok(Json(GetHaikuResp {
        haiku,
        pinata_gateway: state.config.pinata_gateway.clone(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/haikus",
    responses(
        (status = 200, body = GetHaikusResp),
        (status = 500, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state))]
pub(super) async fn get_haikus(State(state): State<AppState>) -> Result<Json<GetHaikusResp>> {
    let batch = load_haikus(&state)
        .await
        .map_err(|e| e.context("Failed to fetch haikus"))?;

    let mut haikus = batch.haikus;
    sort_by_recent(&mut haikus);
    if let Some(limit) = state.config.list_limit {
        haikus.truncate(limit);
    }
    tracing::info!(count = haikus.len(), "processed haikus");

    Ok(Json(GetHaikusResp {
        haikus,
        pinata_gateway: state.config.pinata_gateway.clone(),
        failures: batch.failures,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct GetSearchHaikusQuery {
    /// Comma separated tags, any of which must match.
    #[serde(default)]
    tags: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/haikus/search",
    params(GetSearchHaikusQuery),
    responses(
        (status = 200, body = GetHaikusResp),
        (status = 400, body = ResponseError),
        (status = 500, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state))]
pub(super) async fn get_search_haikus(
    State(state): State<AppState>,
    extract::Query(query): extract::Query<GetSearchHaikusQuery>,
) -> Result<Json<GetHaikusResp>> {
    let search_tags = query
        .tags
        .as_deref()
        .map(split_tags)
        .filter(|tags| !tags.is_empty())
        .context_bad_request("Tags are required for search")?;

    let batch = load_haikus(&state)
        .await
        .map_err(|e| e.context("Failed to search haikus"))?;

    let mut haikus = batch
        .haikus
        .into_iter()
        .filter(|haiku| haiku.has_any_tag(&search_tags))
        .collect::<Vec<_>>();
    sort_by_recent(&mut haikus);
    tracing::info!(count = haikus.len(), "found matching haikus");

    Ok(Json(GetHaikusResp {
        haikus,
        pinata_gateway: state.config.pinata_gateway.clone(),
        failures: batch.failures,
    }))
}

#[utoipa::path(
    get,
    path = "/api/haikus/top",
    responses(
        (status = 200, body = GetHaikusResp),
        (status = 500, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state))]
pub(super) async fn get_top_haikus(State(state): State<AppState>) -> Result<Json<GetHaikusResp>> {
    let batch = load_haikus(&state)
        .await
        .map_err(|e| e.context("Failed to fetch top haikus"))?;

    let mut haikus = batch.haikus;
    sort_by_likes(&mut haikus);
    haikus.truncate(state.config.top_limit);

    Ok(Json(GetHaikusResp {
        haikus,
        pinata_gateway: state.config.pinata_gateway.clone(),
        failures: batch.failures,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(super) struct GetUserHaikusQuery {
    /// Author of the haikus.
    #[serde(default)]
    user_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/haikus/user",
    params(GetUserHaikusQuery),
    responses(
        (status = 200, body = GetUserHaikusResp),
        (status = 400, body = ResponseError),
        (status = 500, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state))]
pub(super) async fn get_user_haikus(
    State(state): State<AppState>,
    extract::Query(query): extract::Query<GetUserHaikusQuery>,
) -> Result<Json<GetUserHaikusResp>> {
    let user_id = query
        .user_id
        .filter(|user_id| !user_id.is_empty())
        .context_bad_request("User ID is required")?;

    let batch = load_haikus(&state)
        .await
        .map_err(|e| e.context("Failed to fetch user haikus"))?;

    let mut haikus = batch
        .haikus
        .into_iter()
        .filter(|haiku| haiku.user_id.as_deref() == Some(user_id.as_str()))
        .collect::<Vec<_>>();
    sort_by_recent(&mut haikus);

    let display_name = haikus
        .first()
        .and_then(|haiku| haiku.display_name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "User".to_string());

    Ok(Json(GetUserHaikusResp {
        haikus,
        pinata_gateway: state.config.pinata_gateway.clone(),
        display_name,
        failures: batch.failures,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct PostHaikuReq {
    text: String,
    /// Image identifier, or the image itself as a data URL.
    #[schema(value_type = Object)]
    selected_image: Value,
    user_id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default, rename = "photoURL")]
    photo_url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct PostHaikuResp {
    success: bool,
    /// CID of the new haiku.
    id: String,
    #[schema(value_type = String, format = "uri")]
    pinata_url: Url,
    message: String,
}

#[utoipa::path(
    post,
    path = "/api/haikus",
    request_body = PostHaikuReq,
    responses(
        (status = 200, body = PostHaikuResp),
        (status = 405, body = ResponseError),
        (status = 500, body = ResponseError),
    ),
)]
#[tracing::instrument(skip(state, req))]
pub(super) async fn post_haiku(
    State(state): State<AppState>,
    Json(req): Json<PostHaikuReq>,
) -> Result<Json<PostHaikuResp>> {
    tracing::info!(user_id = %req.user_id, tags = ?req.tags, "uploading haiku");
    let content = json!({
        "text": req.text,
        "image": req.selected_image,
        "timestamp": Utc::now().timestamp_millis(),
        "userId": req.user_id,
        "displayName": req.display_name,
        "photoURL": req.photo_url,
        "tags": req.tags.join(","),
        "likes": 0,
    });
    let mut keyvalues = Map::new();
    keyvalues.insert("likes".to_string(), json!(0));

    let id = state
        .pinning
        .pin_json(HAIKU_METADATA_NAME, content, keyvalues)
        .await
        .map_err(|e| e.context("Failed to upload haiku"))?;
    tracing::info!(%id, "pinned haiku");

    let pinata_url = gateway_url(&state.config.pinata_gateway, &id)?;
    Ok(Json(PostHaikuResp {
        success: true,
        id,
        pinata_url,
        message: "Haiku uploaded successfully".to_string(),
    }))
}
