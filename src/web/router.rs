use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    modules,
    web::{AppState, auth, dashboard, landing, media},
};

const ROBOTS_TXT_BODY: &str = include_str!("../../robots.txt");

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config().max_upload_bytes;

    Router::new()
        .route("/", get(landing::landing_page))
        .route("/auth", get(auth::auth_page))
        .route("/auth/signin", post(auth::start_sign_in))
        .route("/auth/callback", get(auth::auth_callback))
        .route("/auth/logout", post(auth::logout))
        .route("/dashboard", get(dashboard::dashboard_page))
        .route("/media", get(media::media_proxy))
        .route("/healthz", get(healthz))
        .route("/robots.txt", get(robots_txt))
        .merge(modules::questions::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn robots_txt() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        ROBOTS_TXT_BODY,
    )
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
