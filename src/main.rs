// Módulos de la aplicación
mod api;
mod app_state;
mod chatbot;
mod config;
mod db;
mod llm;
mod models;
mod store;

use crate::app_state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración (falla si no hay OPENAI_API_KEY)
    let cfg = config::AppConfig::from_env()?;

    // 3. Conectar a la base de datos y asegurar el esquema
    let pool = db::connect_from_config(&cfg).await?;
    db::ensure_schema(&pool).await?;

    // 4. Inicializar gestor de LLMs
    let llm_manager = llm::LlmManager::from_config(&cfg)?;

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        store: Arc::new(store::SqlTodoStore::new(pool)),
        llm: Arc::new(llm_manager),
    };

    // 6. Configurar el router de la API
    let app = api::create_router(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr).await?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
