use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::matrix::normalize;
use crate::models::{ChatAnswer, ChatRequest, MatrixSummary, ReloadRequest, ReloadResponse};

#[derive(Clone)]
struct AppState {
    chat: ChatService,
}

pub fn router(chat_service: ChatService) -> Router {
    let state = AppState { chat: chat_service };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/matrix", get(matrix_summary))
        .route("/api/matrix/reload", post(reload_matrix))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: AppConfig, chat_service: ChatService) -> Result<()> {
    let app = router(chat_service);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, ApiError> {
    if normalize(&request.question).is_empty() {
        return Err(ApiError::bad_request("question must not be empty".to_string()));
    }

    let answer = state.chat.answer(request).await?;
    Ok(Json(answer))
}

async fn matrix_summary(State(state): State<AppState>) -> Json<MatrixSummary> {
    Json(state.chat.store().snapshot().await.summary())
}

async fn reload_matrix(
    State(state): State<AppState>,
    request: Option<Json<ReloadRequest>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let force = request.map(|Json(request)| request.force).unwrap_or(false);

    match state.chat.store().reload(force).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            tracing::error!("matrix reload failed: {err:#}");
            Err(ApiError::from(err))
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{value:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
