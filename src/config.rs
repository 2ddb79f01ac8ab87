//! Carga y gestión de configuración de la aplicación (SQLite + LLM).

use std::env;
use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    ///
    /// `OPENAI_API_KEY` es obligatoria: el cliente de Rig la lee del entorno
    /// en cada llamada, así que sin ella el servidor no debe arrancar.
    pub fn from_env() -> Result<Self> {
        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        if llm_provider == LlmProvider::OpenAI {
            match env::var("OPENAI_API_KEY") {
                Ok(key) if !key.trim().is_empty() => {}
                _ => return Err(anyhow!("Falta OPENAI_API_KEY en el entorno")),
            }
        }

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://tudo.db?mode=rwc".to_string());
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4".to_string());

        Ok(Self {
            database_url,
            server_addr,
            llm_provider,
            llm_chat_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert_eq!(LlmProvider::from_str("OpenAI").unwrap(), LlmProvider::OpenAI);
        assert_eq!(LlmProvider::from_str("ollama").unwrap(), LlmProvider::Ollama);
        assert!(LlmProvider::from_str("claude").is_err());
    }
}
