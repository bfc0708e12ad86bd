use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::server::state::{GuardedChatBot, ServerState};

#[derive(Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

async fn ask(
    State(chat_bot): State<GuardedChatBot>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if body.question.trim().is_empty() {
        return Err(AppError::validation("question must not be empty"));
    }
    let answer = chat_bot.ask(&body.question).await?;
    Ok(Json(ChatResponse { answer }))
}

pub fn chat_routes() -> Router<ServerState> {
    Router::new().route("/ask", post(ask))
}
