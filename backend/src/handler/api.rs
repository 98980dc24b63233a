use axum::{routing, Router};
use utoipa::OpenApi;

use crate::{
    error::{Error, ResponseError},
    format_err,
    haiku::{FetchFailure, Haiku},
    state::AppState,
};

mod haiku;
mod like;

#[derive(OpenApi)]
#[openapi(
    paths(
        haiku::get_haiku,
        haiku::get_haikus,
        haiku::post_haiku,
        haiku::get_search_haikus,
        haiku::get_top_haikus,
        haiku::get_user_haikus,
        like::post_like,
        like::get_likes,
    ),
    components(schemas(
        Haiku,
        FetchFailure,
        ResponseError,
        haiku::GetHaikuResp,
        haiku::GetHaikusResp,
        haiku::GetUserHaikusResp,
        haiku::PostHaikuReq,
        haiku::PostHaikuResp,
        like::PostLikeReq,
        like::PostLikeResp,
        like::GetLikesResp,
    ))
)]
pub(super) struct ApiDoc;

pub(super) fn create_router() -> Router<AppState> {
    let haikus = self::haiku::create_router();
    let likes = self::like::create_router();

    Router::new()
        .nest("/haikus", haikus)
        .nest("/likes", likes)
        .route("/haiku", routing::get(self::haiku::get_haiku))
        .route("/healthz", routing::get(get_healthz))
}

async fn get_healthz() -> &'static str {
    "OK"
}

async fn method_not_allowed() -> Error {
    format_err!(METHOD_NOT_ALLOWED, "Method Not Allowed")
}
