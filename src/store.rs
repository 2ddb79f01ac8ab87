//! Acceso a la tabla `tudo`.
//!
//! `TodoStore` es el único punto de contacto con la base de datos: lo usan
//! tanto los endpoints CRUD como el chatbot, que además ejecuta a través de
//! él las consultas generadas por el LLM.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    query::Query,
    sqlite::{SqliteArguments, SqlitePool, SqliteRow},
    Column, Row as _, Sqlite, TypeInfo, ValueRef,
};

use crate::models::{NewTodo, Row, Todo};

#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Todo>>;

    async fn get(&self, id: i64) -> Result<Option<Todo>>;

    /// Inserta un registro y devuelve el id generado.
    async fn create(&self, todo: &NewTodo) -> Result<i64>;

    /// Devuelve `false` si no existe ningún registro con ese id.
    async fn update(&self, id: i64, todo: &NewTodo) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Nombres distintos, en el orden en que los devuelve la base de datos.
    async fn distinct_names(&self) -> Result<Vec<String>>;

    /// Ejecuta una consulta parametrizada tal cual llega y devuelve las filas
    /// como objetos JSON con las columnas en orden.
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>>;
}

#[derive(Clone)]
pub struct SqlTodoStore {
    pool: SqlitePool,
}

impl SqlTodoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TodoStore for SqlTodoStore {
    async fn list(&self) -> Result<Vec<Todo>> {
        let todos = sqlx::query_as::<_, Todo>("SELECT * FROM tudo")
            .fetch_all(&self.pool)
            .await?;
        Ok(todos)
    }

    async fn get(&self, id: i64) -> Result<Option<Todo>> {
        let todo = sqlx::query_as::<_, Todo>("SELECT * FROM tudo WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(todo)
    }

    async fn create(&self, todo: &NewTodo) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO tudo (name, age, date, description, place) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&todo.name)
        .bind(todo.age)
        .bind(todo.date)
        .bind(&todo.description)
        .bind(&todo.place)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&self, id: i64, todo: &NewTodo) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tudo SET name = ?, age = ?, date = ?, description = ?, place = ? WHERE id = ?",
        )
        .bind(&todo.name)
        .bind(todo.age)
        .bind(todo.date)
        .bind(&todo.description)
        .bind(&todo.place)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tudo WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn distinct_names(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>("SELECT DISTINCT name FROM tudo")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut statement = sqlx::query(query);
        for param in params {
            statement = bind_json(statement, param);
        }
        let rows = statement.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_json).collect()
    }
}

fn bind_json<'q>(
    statement: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => statement.bind(None::<String>),
        Value::Bool(b) => statement.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => statement.bind(i),
            None => statement.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => statement.bind(s.clone()),
        // Arrays y objetos se guardan como su texto JSON.
        other => statement.bind(other.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT8" | "BOOLEAN" => {
                    Value::from(row.try_get_unchecked::<i64, _>(idx)?)
                }
                "REAL" | "NUMERIC" => Value::from(row.try_get_unchecked::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
                    Value::from(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::from(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use chrono::NaiveDate;
    use serde_json::json;

    fn john() -> NewTodo {
        NewTodo {
            name: "John".to_string(),
            age: 25,
            place: "New York".to_string(),
            description: "Software Engineer".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, 26).unwrap(),
        }
    }

    #[tokio::test]
    async fn crud_lifecycle() {
        let store = SqlTodoStore::new(memory_pool().await);

        let id = store.create(&john()).await.unwrap();
        let saved = store.get(id).await.unwrap().expect("registro creado");
        assert_eq!(saved.name, "John");
        assert_eq!(saved.date, NaiveDate::from_ymd_opt(2024, 2, 26).unwrap());

        let mut changed = john();
        changed.age = 26;
        assert!(store.update(id, &changed).await.unwrap());
        assert_eq!(store.get(id).await.unwrap().unwrap().age, 26);
        assert!(!store.update(id + 100, &changed).await.unwrap());

        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn distinct_names_collapses_duplicates() {
        let store = SqlTodoStore::new(memory_pool().await);
        store.create(&john()).await.unwrap();
        store.create(&john()).await.unwrap();
        let mut jane = john();
        jane.name = "Jane".to_string();
        store.create(&jane).await.unwrap();

        let mut names = store.distinct_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["Jane".to_string(), "John".to_string()]);
    }

    #[tokio::test]
    async fn execute_keeps_column_order_and_binds_params() {
        let store = SqlTodoStore::new(memory_pool().await);
        store.create(&john()).await.unwrap();

        let rows = store
            .execute("SELECT age, name, place FROM tudo WHERE name = ?", &[json!("John")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, ["age", "name", "place"]);
        assert_eq!(rows[0]["age"], json!(25));
        assert_eq!(rows[0]["name"], json!("John"));
    }

    #[tokio::test]
    async fn execute_insert_returns_no_rows() {
        let store = SqlTodoStore::new(memory_pool().await);
        let rows = tokio_test::assert_ok!(
            store
                .execute(
                    "INSERT INTO tudo (name, age, place, description, date) VALUES (?, ?, ?, ?, ?)",
                    &[json!("Ann"), json!(31), json!("Lima"), json!("Chef"), json!("2024-03-01")],
                )
                .await
        );
        assert!(rows.is_empty());
        assert_eq!(store.distinct_names().await.unwrap(), vec!["Ann".to_string()]);
    }

    #[tokio::test]
    async fn schema_rejects_badly_typed_values() {
        let store = SqlTodoStore::new(memory_pool().await);
        let insert =
            "INSERT INTO tudo (name, age, place, description, date) VALUES (?, ?, ?, ?, ?)";

        let bad_age = [
            json!("Ann"),
            json!("forty"),
            json!("Lima"),
            json!("Chef"),
            json!("2024-03-01"),
        ];
        assert!(store.execute(insert, &bad_age).await.is_err());
        let bad_date = [
            json!("Ann"),
            json!(40),
            json!("Lima"),
            json!("Chef"),
            json!("next Tuesday"),
        ];
        assert!(store.execute(insert, &bad_date).await.is_err());
        let numeric_text_age = [
            json!("Ann"),
            json!("40"),
            json!("Lima"),
            json!("Chef"),
            json!("2024-03-01"),
        ];
        assert!(store.execute(insert, &numeric_text_age).await.is_ok());

        let todos = store.list().await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].age, 40);
    }

    #[tokio::test]
    async fn execute_surfaces_sql_errors() {
        let store = SqlTodoStore::new(memory_pool().await);
        assert!(store.execute("SELECT nope FROM missing", &[]).await.is_err());
    }
}
