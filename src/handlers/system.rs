use crate::state::AppState;
use axum::{
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use tracing::error;

pub async fn health() -> &'static str {
    "Ok."
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_registered_chats(state.registry.len());
    match state.metrics.render() {
        Ok(body) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
