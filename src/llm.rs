//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.

use crate::config::{AppConfig, LlmProvider};
use crate::models::{ChatMessage, Role};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Instrucción de sistema para las respuestas conversacionales.
pub const ASSISTANT_PREAMBLE: &str = "You are a helpful assistant.";

/// Cualquier modelo capaz de completar una conversación.
///
/// `history` son los turnos previos (sin incluir `prompt`); los mensajes con
/// rol `system` se ignoran porque la instrucción de sistema va en `preamble`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        preamble: Option<&str>,
        history: &[ChatMessage],
        prompt: &str,
    ) -> Result<String>;
}

/// Gestor de LLMs.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if !matches!(cfg.llm_provider, LlmProvider::OpenAI) {
            return Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                cfg.llm_provider
            ));
        }
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    async fn complete_with_openai(
        &self,
        preamble: Option<&str>,
        history: &[ChatMessage],
        prompt: &str,
    ) -> Result<String> {
        use rig::providers::openai;
        // Traits para client.agent(...), agent.prompt(...) y agent.chat(...)
        use rig::client::CompletionClient as _;
        use rig::completion::{Chat, Message, Prompt};

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4"
        } else {
            self.chat_model.as_str()
        };

        let mut builder = client.agent(model_name);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        let agent = builder.build();

        if history.is_empty() {
            return Ok(agent.prompt(prompt).await?);
        }

        let chat_history: Vec<Message> = history
            .iter()
            .filter_map(|m| match m.role {
                Role::User => Some(Message::user(m.content.clone())),
                Role::Assistant => Some(Message::assistant(m.content.clone())),
                Role::System => None,
            })
            .collect();

        Ok(agent.chat(prompt, chat_history).await?)
    }
}

#[async_trait]
impl ChatModel for LlmManager {
    async fn complete(
        &self,
        preamble: Option<&str>,
        history: &[ChatMessage],
        prompt: &str,
    ) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(preamble, history, prompt).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Doble de `ChatModel` para los tests: responde con una función y
    //! registra cada llamada.

    use super::*;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(Option<&str>, &str) -> Result<String> + Send + Sync>;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub preamble: Option<String>,
        pub history_len: usize,
        pub prompt: String,
    }

    pub struct ScriptedModel {
        responder: Responder,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedModel {
        pub fn new(
            responder: impl Fn(Option<&str>, &str) -> Result<String> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Modelo que falla si se le llama.
        pub fn unreachable() -> Self {
            Self::new(|_, prompt| Err(anyhow!("llamada inesperada al LLM: {prompt}")))
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            preamble: Option<&str>,
            history: &[ChatMessage],
            prompt: &str,
        ) -> Result<String> {
            self.calls.lock().unwrap().push(Call {
                preamble: preamble.map(str::to_string),
                history_len: history.len(),
                prompt: prompt.to_string(),
            });
            (self.responder)(preamble, prompt)
        }
    }
}
