use crate::config::AppConfig;
use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

pub async fn connect_from_config(cfg: &AppConfig) -> Result<SqlitePool> {
    info!("Conectando a la base de datos en {}...", cfg.database_url);
    let pool = connect(&cfg.database_url, 5).await?;
    info!("Conexión a la base de datos OK");
    Ok(pool)
}

/// Abre un pool sobre `url`. Una base `sqlite::memory:` sólo es compartida
/// dentro de una misma conexión, así que los tests usan `max_connections = 1`.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

/// Crea la tabla `tudo` si no existe.
///
/// SQLite guarda cualquier valor en cualquier columna; los CHECK rechazan una
/// edad que no sea entera o una fecha que no sea `YYYY-MM-DD`, para que ninguna
/// fila impida decodificar la tabla como `Todo`.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tudo (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL CHECK (typeof(name) = 'text'),
            age         INTEGER NOT NULL CHECK (typeof(age) = 'integer'),
            place       TEXT    NOT NULL CHECK (typeof(place) = 'text'),
            description TEXT    NOT NULL CHECK (typeof(description) = 'text'),
            date        DATE    NOT NULL CHECK (date IS date(date))
        )",
    )
    .execute(pool)
    .await?;

    info!("Esquema de la base de datos asegurado (tabla tudo).");
    Ok(())
}

#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}
