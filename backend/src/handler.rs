use axum::{
    http::{header::SERVER, HeaderValue, Request},
    middleware::Next,
    response::Response,
    Router,
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use crate::state::AppState;

mod api;

async fn server_header_middleware<B>(req: Request<B>, next: Next<B>) -> Response {
    let mut resp = next.run(req).await;
    resp.headers_mut().insert(
        SERVER,
        HeaderValue::from_static(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        )),
    );
    resp
}

pub fn create_router(state: AppState) -> Router {
    let api = self::api::create_router();

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .merge(Redoc::with_url("/docs", self::api::ApiDoc::openapi()))
        .layer(
            TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)),
        )
        .layer(axum::middleware::from_fn(server_header_middleware))
}
