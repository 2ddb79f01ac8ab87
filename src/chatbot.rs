//! Chatbot sobre la tabla `tudo`: traduce lenguaje natural a SQL con el LLM.
//!
//! Flujo por petición:
//!   1. Se leen todos los nombres distintos de la tabla y se busca cuál
//!      aparece en el último mensaje (`resolve_entity`).
//!   2. Si no aparece ninguno, el mensaje va tal cual al LLM (`fallback_reply`).
//!   3. Si aparece, el LLM genera uno o varios descriptores de consulta o
//!      pide los campos que faltan (`synthesize`).
//!   4. Cada descriptor se ejecuta (`execute`) y su resultado se convierte en
//!      una frase que el LLM reformula (`assemble`).
//!   5. Las frases se unen en el orden en que se generaron los descriptores.
//!
//! La salida del LLM se trata como entrada no confiable: o se decodifica
//! entera a una forma conocida y pasa la validación, o la síntesis falla.

use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    llm::{ChatModel, ASSISTANT_PREAMBLE},
    models::{ChatMessage, QueryDescriptor, Row},
    store::TodoStore,
};

/// Respuesta fija cuando la generación falla.
pub const APOLOGY: &str = "An error occurred while processing your request.";

/// Respuesta fija para un INSERT o un SELECT sin filas (no se distinguen).
pub const EMPTY_RESULT: &str = "Data successfully added or no results found.";

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisResult {
    Deferred {
        missing_fields: Vec<String>,
        message: String,
    },
    Executable {
        descriptors: Vec<QueryDescriptor>,
    },
    Failed {
        reason: String,
    },
}

/// Motivo único de `Failed`; el detalle sólo va al log.
pub const GENERATION_ERROR: &str = "generation error";

impl SynthesisResult {
    fn generation_error() -> Self {
        Self::Failed {
            reason: GENERATION_ERROR.to_string(),
        }
    }
}

fn reject(detail: &str, raw: &str) -> SynthesisResult {
    warn!("No se pudo interpretar la salida del LLM ({detail}). Respuesta LLM: '{raw}'");
    SynthesisResult::generation_error()
}

// --- Resolución de entidades ---

/// Primer nombre conocido (en el orden de la base de datos) contenido en el
/// mensaje, sin distinguir mayúsculas. "Ann" gana a "Anna" si va antes.
pub fn resolve_entity(message: &str, known_names: &[String]) -> Option<String> {
    let message = message.to_lowercase();
    known_names
        .iter()
        .find(|name| message.contains(&name.to_lowercase()))
        .cloned()
}

/// Todos los nombres conocidos que aparecen en el mensaje, mismo criterio.
pub fn mentioned_names(message: &str, known_names: &[String]) -> Vec<String> {
    let message = message.to_lowercase();
    known_names
        .iter()
        .filter(|name| message.contains(&name.to_lowercase()))
        .cloned()
        .collect()
}

// --- Síntesis de consultas ---

pub fn build_synthesis_prompt(user_query: &str, names: &[String]) -> String {
    format!(
        r#"
Convert the following user question into a secure SQL query:
"{user_query}"

Names mentioned in the question (use them exactly as written): {names}

Database Schema:
- Table: tudo (id, name, age, place, description, date)
- The id column is generated by the database; never insert it.
- Always use ? placeholders and put every value in "params". Never inline literals.
- Only SELECT and INSERT statements against the tudo table are allowed.

Step 1: Determine whether the query is a **fetch request (SELECT)** or **insert request (INSERT)**.
Step 2: If it's a **fetch request**, generate the correct **SELECT** query based on the available attributes.
Step 3: If it's an **insert request**, check for missing fields (name, age, place, description, date).
Step 4: If any required field is missing, return a message asking the user to provide them.
Step 5: If the question is about several people, return a JSON array with one object per person, in the order they are mentioned.

Reply with JSON only.

**Example Outputs:**

**For Fetch Request (SELECT)**
User: "What is John's age?"
Output:
{{ "query": "SELECT age FROM tudo WHERE name = ?", "params": ["John"] }}

User: "Give me details of Hashim."
Output:
{{ "query": "SELECT * FROM tudo WHERE name = ?", "params": ["Hashim"] }}

User: "Where do John and Jane live?"
Output:
[
  {{ "query": "SELECT place FROM tudo WHERE name = ?", "params": ["John"] }},
  {{ "query": "SELECT place FROM tudo WHERE name = ?", "params": ["Jane"] }}
]

**For Insert Request (INSERT)**
User: "Add John with age 25 and date 2024-02-26."
Output (If fields are missing):
{{ "missingFields": ["place", "description"], "message": "Please provide the place and description to add this record." }}

Output (If all fields are present):
{{ "query": "INSERT INTO tudo (name, age, place, description, date) VALUES (?, ?, ?, ?, ?)", "params": ["John", 25, "New York", "Software Engineer", "2024-02-26"] }}
"#,
        names = names.join(", ")
    )
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDescriptor {
    Deferral {
        #[serde(rename = "missingFields")]
        missing_fields: Vec<String>,
        message: String,
    },
    Query {
        query: String,
        #[serde(default)]
        params: Vec<Value>,
    },
}

/// Primera estructura JSON (objeto o array) bien formada dentro del texto,
/// ignorando la prosa o los bloques ``` que la rodeen.
fn extract_structured(raw: &str) -> Option<Value> {
    raw.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .find_map(|(start, _)| {
            let mut stream =
                serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) if value.is_object() || value.is_array() => Some(value),
                _ => None,
            }
        })
}

/// Decodifica la respuesta cruda del LLM.
pub fn parse_synthesis(raw: &str) -> SynthesisResult {
    let Some(value) = extract_structured(raw) else {
        return reject("no JSON structure in LLM output", raw);
    };

    let items = match value {
        Value::Array(items) if items.is_empty() => {
            return reject("empty descriptor list", raw);
        }
        Value::Array(items) => items,
        object => vec![object],
    };

    let mut decoded = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<RawDescriptor>(item) {
            Ok(descriptor) => decoded.push(descriptor),
            Err(e) => return reject(&format!("unrecognized descriptor: {e}"), raw),
        }
    }

    // Basta con una petición de campos para diferir; se usa la primera.
    if let Some((missing_fields, message)) = decoded.iter().find_map(|d| match d {
        RawDescriptor::Deferral {
            missing_fields,
            message,
        } => Some((missing_fields.clone(), message.clone())),
        RawDescriptor::Query { .. } => None,
    }) {
        return SynthesisResult::Deferred {
            missing_fields,
            message,
        };
    }

    let mut descriptors = Vec::with_capacity(decoded.len());
    for item in decoded {
        if let RawDescriptor::Query { query, params } = item {
            let descriptor = QueryDescriptor { query, params };
            if let Err(reason) = validate_descriptor(&descriptor) {
                return reject(&reason, raw);
            }
            descriptors.push(descriptor);
        }
    }

    SynthesisResult::Executable { descriptors }
}

const FORBIDDEN_WORDS: [&str; 4] = ["union", "attach", "pragma", "load_extension"];

/// Lista blanca mínima para el SQL escrito por el LLM: una sola sentencia
/// SELECT o INSERT que nombra `tudo`, sin `UNION` ni tablas internas
/// `sqlite_*`, y con tantos `?` como parámetros. No es un parser de SQL: las
/// columnas, los `WHERE` y las subconsultas sobre `tudo` se aceptan tal cual.
pub fn validate_descriptor(descriptor: &QueryDescriptor) -> Result<(), String> {
    let query = descriptor.query.trim().trim_end_matches(';').trim_end();
    if query.contains(';') {
        return Err("multiple statements are not allowed".to_string());
    }

    let lowered = query.to_lowercase();
    let verb = lowered.split_whitespace().next().unwrap_or_default();
    if verb != "select" && verb != "insert" {
        return Err(format!("statement '{verb}' is not allowed"));
    }

    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .collect();
    if let Some(word) = words
        .iter()
        .copied()
        .find(|word| FORBIDDEN_WORDS.contains(word) || word.starts_with("sqlite_"))
    {
        return Err(format!("'{word}' is not allowed"));
    }
    if !words.contains(&"tudo") {
        return Err("query does not target the tudo table".to_string());
    }

    let placeholders = query.matches('?').count();
    if placeholders != descriptor.params.len() {
        return Err(format!(
            "{placeholders} placeholders but {} params",
            descriptor.params.len()
        ));
    }

    Ok(())
}

/// Pide al LLM los descriptores para el último mensaje de la conversación.
pub async fn synthesize(
    llm: &dyn ChatModel,
    history: &[ChatMessage],
    known_names: &[String],
) -> SynthesisResult {
    let Some(last) = history.last() else {
        warn!("Síntesis sin mensajes");
        return SynthesisResult::generation_error();
    };

    let prompt = build_synthesis_prompt(&last.content, known_names);
    match llm.complete(None, &[], &prompt).await {
        Ok(raw) => {
            debug!("Respuesta del LLM para la síntesis: {raw}");
            parse_synthesis(&raw)
        }
        Err(e) => {
            error!("Error generando SQL: {e}");
            SynthesisResult::generation_error()
        }
    }
}

// --- Ejecución y ensamblado ---

/// Ejecuta un descriptor. Un error de base de datos se registra y se trata
/// como cero filas.
pub async fn execute(store: &dyn TodoStore, descriptor: &QueryDescriptor) -> Vec<Row> {
    match store.execute(&descriptor.query, &descriptor.params).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Error en la consulta '{}': {e}", descriptor.query);
            Vec::new()
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convierte el resultado de un descriptor en una frase para el usuario.
pub async fn assemble(
    llm: &dyn ChatModel,
    name: &str,
    descriptor: &QueryDescriptor,
    rows: &[Row],
) -> String {
    let first_column = rows.first().and_then(|row| row.iter().next());
    let (key, value) = match first_column {
        Some(column) if descriptor.is_select() => column,
        _ => return EMPTY_RESULT.to_string(),
    };

    let data = format!("{name}'s {key} is {}.", display_value(value));
    match llm
        .complete(Some(ASSISTANT_PREAMBLE), &[], &format!("Rephrase this: {data}"))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!("No se pudo reformular '{data}': {e}");
            data
        }
    }
}

/// Nombre al que se refiere un descriptor: el primer parámetro que coincide
/// con un nombre mencionado, o el nombre resuelto.
fn subject_of<'a>(
    descriptor: &QueryDescriptor,
    mentioned: &'a [String],
    resolved: &'a str,
) -> &'a str {
    descriptor
        .params
        .iter()
        .filter_map(Value::as_str)
        .find_map(|param| mentioned.iter().find(|name| name.eq_ignore_ascii_case(param)))
        .map(String::as_str)
        .unwrap_or(resolved)
}

/// Respuesta directa del LLM cuando el mensaje no menciona a nadie conocido.
pub async fn fallback_reply(llm: &dyn ChatModel, messages: &[ChatMessage]) -> String {
    let Some((last, earlier)) = messages.split_last() else {
        return APOLOGY.to_string();
    };
    match llm.complete(Some(ASSISTANT_PREAMBLE), earlier, &last.content).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Error en la respuesta directa del LLM: {e}");
            APOLOGY.to_string()
        }
    }
}

/// Orquesta una petición completa y devuelve el texto de la respuesta.
/// Nunca falla: cualquier error acaba en una frase fija.
pub async fn respond(
    store: &dyn TodoStore,
    llm: &dyn ChatModel,
    messages: &[ChatMessage],
) -> String {
    let Some(last) = messages.last() else {
        return APOLOGY.to_string();
    };

    let names = match store.distinct_names().await {
        Ok(names) => names,
        Err(e) => {
            error!("Error obteniendo los nombres: {e}");
            Vec::new()
        }
    };

    let Some(name) = resolve_entity(&last.content, &names) else {
        info!("Ningún nombre conocido en el mensaje; respuesta directa del LLM.");
        return fallback_reply(llm, messages).await;
    };
    info!("Entidad resuelta: {name}");

    let mentioned = mentioned_names(&last.content, &names);
    match synthesize(llm, messages, &mentioned).await {
        SynthesisResult::Deferred {
            missing_fields,
            message,
        } => {
            info!("Faltan campos: {}", missing_fields.join(", "));
            message
        }
        SynthesisResult::Failed { reason } => {
            warn!("Síntesis fallida: {reason}");
            APOLOGY.to_string()
        }
        SynthesisResult::Executable { descriptors } => {
            info!("Ejecutando {} consulta(s) generada(s)", descriptors.len());
            let replies = join_all(descriptors.iter().map(|descriptor| {
                let subject = subject_of(descriptor, &mentioned, &name);
                async move {
                    let rows = execute(store, descriptor).await;
                    assemble(llm, subject, descriptor, &rows).await
                }
            }))
            .await;
            // join_all conserva el orden de entrada, no el de finalización.
            replies.join(" ")
        }
    }
}
