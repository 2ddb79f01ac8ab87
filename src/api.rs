use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::AppState,
    chatbot,
    models::{ChatMessage, NewTodo, Todo},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ChatbotPayload {
    #[serde(default)]
    messages: Option<Vec<ChatMessage>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotResponse {
    bot_reply: ChatMessage,
}

/// Cuerpo de alta/modificación. Todos los campos son opcionales aquí para
/// poder responder con el mensaje de validación propio.
#[derive(Deserialize)]
pub struct TodoPayload {
    name: Option<String>,
    age: Option<i64>,
    place: Option<String>,
    description: Option<String>,
    date: Option<NaiveDate>,
}

impl TodoPayload {
    fn into_new_todo(self) -> Option<NewTodo> {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        Some(NewTodo {
            name: non_empty(self.name)?,
            age: self.age?,
            place: non_empty(self.place)?,
            description: non_empty(self.description)?,
            date: self.date?,
        })
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/chatbot", post(chatbot_handler))
        .route("/api/health", get(health_handler))
        .route("/todos", get(list_todos_handler).post(save_todo_handler))
        .route(
            "/todos/:id",
            put(update_todo_handler)
                .get(get_todo_handler)
                .delete(delete_todo_handler),
        )
        .with_state(app_state)
}

fn internal_error(context: &str, e: anyhow::Error) -> ApiError {
    error!("{context}: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal Server Error"})),
    )
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Todo not found"})))
}

fn missing_fields() -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "All fields are required"})),
    )
}

// --- Handlers ---

#[axum::debug_handler]
async fn chatbot_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatbotPayload>,
) -> Result<Json<ChatbotResponse>, ApiError> {
    let messages = match payload.messages {
        Some(messages) if !messages.is_empty() => messages,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Messages are required"})),
            ));
        }
    };
    info!("Petición al chatbot con {} mensaje(s)", messages.len());

    let content = chatbot::respond(state.store.as_ref(), state.llm.as_ref(), &messages).await;
    Ok(Json(ChatbotResponse {
        bot_reply: ChatMessage::assistant(content),
    }))
}

#[axum::debug_handler]
async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.store.distinct_names().await {
        Ok(names) => Ok(Json(json!({ "status": "ok", "names": names.len() }))),
        Err(e) => {
            error!("Error en el health check de la base de datos: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[axum::debug_handler]
async fn list_todos_handler(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiError> {
    state
        .store
        .list()
        .await
        .map(Json)
        .map_err(|e| internal_error("Error consultando los registros", e))
}

#[axum::debug_handler]
async fn get_todo_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, ApiError> {
    match state.store.get(id).await {
        Ok(Some(todo)) => Ok(Json(todo)),
        Ok(None) => Err(not_found()),
        Err(e) => Err(internal_error("Error consultando el registro", e)),
    }
}

#[axum::debug_handler]
async fn save_todo_handler(
    State(state): State<AppState>,
    Json(payload): Json<TodoPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let todo = payload.into_new_todo().ok_or_else(missing_fields)?;

    match state.store.create(&todo).await {
        Ok(id) => {
            info!("Registro {id} guardado ({})", todo.name);
            Ok((
                StatusCode::CREATED,
                Json(json!({ "message": "Tudo saved", "id": id })),
            ))
        }
        Err(e) => {
            error!("Error guardando el registro: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Database error", "details": e.to_string() })),
            ))
        }
    }
}

#[axum::debug_handler]
async fn update_todo_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<TodoPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let todo = payload.into_new_todo().ok_or_else(missing_fields)?;

    match state.store.update(id, &todo).await {
        Ok(true) => Ok(Json(json!({ "message": "Todo updated successfully" }))),
        Ok(false) => Err(not_found()),
        Err(e) => Err(internal_error("Error actualizando el registro", e)),
    }
}

#[axum::debug_handler]
async fn delete_todo_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.store.delete(id).await {
        Ok(true) => Ok(Json(json!({ "message": "Todo deleted successfully" }))),
        Ok(false) => Err(not_found()),
        Err(e) => Err(internal_error("Error borrando el registro", e)),
    }
}
