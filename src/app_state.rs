use std::sync::Arc;
use crate::{config::AppConfig, llm::ChatModel, store::TodoStore};

/// Estado compartido por todos los handlers. Las dependencias externas se
/// inyectan como objetos de trait para poder sustituirlas en los tests.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn TodoStore>,
    pub llm: Arc<dyn ChatModel>,
}
