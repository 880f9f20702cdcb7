mod handler;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use parley_core::AppState;
use serde::Deserialize;

#[derive(Deserialize)]
struct WsAuth {
    token: String,
}

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/ws/interview", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(auth): Query<WsAuth>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match parley_core::auth::validate_token(&auth.token, &state.config.jwt_secret) {
        Ok(claims) => ws
            .on_upgrade(move |socket| handler::handle_connection(socket, state, claims.sub))
            .into_response(),
        Err(_) => (StatusCode::UNAUTHORIZED, "invalid or expired token").into_response(),
    }
}
