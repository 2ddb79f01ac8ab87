//! Modelos de dominio (registros de la tabla `tudo` y mensajes del chat).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Representa una fila de la tabla `tudo`.
/// El `id` lo asigna la base de datos al insertar y no cambia nunca.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Todo {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub place: String,
    pub description: String,
    pub date: NaiveDate,
}

/// Campos de un registro sin su identificador (alta y modificación).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTodo {
    pub name: String,
    pub age: i64,
    pub place: String,
    pub description: String,
    pub date: NaiveDate,
}

/// Participante de una conversación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    #[cfg(test)]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Consulta parametrizada generada por el LLM. Nunca se persiste.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub query: String,
    pub params: Vec<Value>,
}

impl QueryDescriptor {
    pub fn is_select(&self) -> bool {
        self.query
            .trim_start()
            .get(..6)
            .map(|verb| verb.eq_ignore_ascii_case("select"))
            .unwrap_or(false)
    }
}

/// Una fila devuelta por una consulta arbitraria, con las columnas en orden.
pub type Row = serde_json::Map<String, Value>;
