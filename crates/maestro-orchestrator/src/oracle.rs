//! Boundary to the external reasoning oracle.
//!
//! The oracle is a black box that answers a prompt with free text expected to
//! contain one JSON object. Everything in this module turns that text into
//! typed outcomes exactly once, so the rest of the pipeline never sees raw
//! oracle output.

use crate::types::{ActionPayload, Complexity};
use async_trait::async_trait;
use maestro_core::{ActionKind, MaestroError, MaestroResult};
use serde::Deserialize;
use serde_json::{Map, Value};

/// The external natural-language reasoning service.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Send a prompt, receive the raw reply text.
    async fn ask(&self, prompt: &str) -> MaestroResult<String>;
}

/// Why an oracle answer could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle reply is not a JSON object: {0}")]
    Malformed(String),
    #[error("oracle reply does not match the expected schema: {0}")]
    Schema(String),
}

impl From<OracleError> for MaestroError {
    fn from(e: OracleError) -> Self {
        MaestroError::Oracle(e.to_string())
    }
}

/// Validated classification answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub complexity: Complexity,
    pub estimated_duration_secs: u64,
    pub required_capabilities: Vec<String>,
}

/// One validated action proposal. Dependencies are indices into the proposal list.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    pub kind: ActionKind,
    pub description: String,
    pub payload: ActionPayload,
    pub dependencies: Vec<usize>,
    pub priority: u8,
}

/// Validated decomposition answer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionOutcome {
    pub actions: Vec<ProposedAction>,
}

/// Pull the JSON object out of an oracle reply.
///
/// Accepts a bare object, an object inside a Markdown code fence, or an object
/// surrounded by prose.
pub fn extract_json(text: &str) -> Result<Map<String, Value>, OracleError> {
    let candidate = fenced_block(text).unwrap_or(text).trim();
    let candidate = match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if start < end => &candidate[start..=end],
        _ => return Err(OracleError::Malformed(preview(text))),
    };
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(OracleError::Malformed(preview(text))),
        Err(e) => Err(OracleError::Malformed(e.to_string())),
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // skip the info string (e.g. "json")
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > 120 {
        let cut: String = trimmed.chars().take(120).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClassification {
    complexity: String,
    #[serde(alias = "estimated_duration")]
    estimated_duration: f64,
    #[serde(default, alias = "required_capabilities")]
    required_capabilities: Vec<String>,
}

/// Parse a classification reply: `{complexity, estimatedDuration, requiredCapabilities}`.
///
/// `estimatedDuration` is in seconds.
pub fn parse_classification(text: &str) -> Result<ClassificationOutcome, OracleError> {
    let map = extract_json(text)?;
    let raw: RawClassification = serde_json::from_value(Value::Object(map))
        .map_err(|e| OracleError::Schema(e.to_string()))?;

    let complexity = Complexity::parse(&raw.complexity)
        .ok_or_else(|| OracleError::Schema(format!("unknown complexity '{}'", raw.complexity)))?;
    if !raw.estimated_duration.is_finite() || raw.estimated_duration < 0.0 {
        return Err(OracleError::Schema(format!(
            "invalid estimatedDuration {}",
            raw.estimated_duration
        )));
    }

    let mut required_capabilities: Vec<String> = raw
        .required_capabilities
        .into_iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    required_capabilities.sort();
    required_capabilities.dedup();

    Ok(ClassificationOutcome {
        complexity,
        estimated_duration_secs: raw.estimated_duration.round() as u64,
        required_capabilities,
    })
}

#[derive(Deserialize)]
struct RawDecomposition {
    actions: Vec<RawAction>,
    #[serde(default)]
    dependencies: Vec<RawEdge>,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    dependencies: Vec<Value>,
    #[serde(default)]
    priority: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEdge {
    #[serde(alias = "task_id")]
    task_id: Value,
    #[serde(alias = "depends_on")]
    depends_on: Value,
}

/// Parse a decomposition reply:
/// `{actions: [{type, description, payload, dependencies, priority}], dependencies: [{taskId, dependsOn, priority}]}`.
///
/// Dependency references may be indices, numeric strings, `action_<n>` or
/// `<anything>_action_<n>`. The top-level edge list is merged into the
/// per-action lists.
pub fn parse_decomposition(text: &str) -> Result<DecompositionOutcome, OracleError> {
    let map = extract_json(text)?;
    let raw: RawDecomposition = serde_json::from_value(Value::Object(map))
        .map_err(|e| OracleError::Schema(e.to_string()))?;

    if raw.actions.is_empty() {
        return Err(OracleError::Schema("no actions proposed".to_string()));
    }
    let count = raw.actions.len();

    let mut actions = Vec::with_capacity(count);
    for (index, action) in raw.actions.into_iter().enumerate() {
        let kind: ActionKind = action
            .kind
            .parse()
            .map_err(|_| OracleError::Schema(format!("unknown action type '{}'", action.kind)))?;
        let description = action.description.trim().to_string();
        let payload = parse_payload(kind, &action.payload, &description)?;

        let mut dependencies = Vec::new();
        for reference in &action.dependencies {
            let dep = resolve_reference(reference, count)?;
            if dep == index {
                return Err(OracleError::Schema(format!("action {index} depends on itself")));
            }
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        let priority = action.priority.unwrap_or(5.0).round().clamp(1.0, 10.0) as u8;

        actions.push(ProposedAction {
            kind,
            description,
            payload,
            dependencies,
            priority,
        });
    }

    for edge in &raw.dependencies {
        let dependent = resolve_reference(&edge.task_id, count)?;
        let prerequisite = resolve_reference(&edge.depends_on, count)?;
        if dependent == prerequisite {
            return Err(OracleError::Schema(format!(
                "action {dependent} depends on itself"
            )));
        }
        let deps = &mut actions[dependent].dependencies;
        if !deps.contains(&prerequisite) {
            deps.push(prerequisite);
        }
    }

    Ok(DecompositionOutcome { actions })
}

fn resolve_reference(reference: &Value, count: usize) -> Result<usize, OracleError> {
    let index = match reference {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            let tail = lowered.rsplit("action_").next().unwrap_or(&lowered);
            tail.trim().parse::<u64>().ok()
        }
        _ => None,
    }
    .and_then(|i| usize::try_from(i).ok());
    match index {
        Some(i) if i < count => Ok(i),
        _ => Err(OracleError::Schema(format!(
            "dependency reference {reference} does not name one of the {count} actions"
        ))),
    }
}

fn str_field(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parse_payload(
    kind: ActionKind,
    payload: &Value,
    description: &str,
) -> Result<ActionPayload, OracleError> {
    let empty = Map::new();
    let fields = match payload {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(OracleError::Schema(format!(
                "{kind} payload must be an object, got {other}"
            )))
        }
    };
    let missing = |field: &str| OracleError::Schema(format!("{kind} payload is missing '{field}'"));

    let parsed = match kind {
        ActionKind::ReadFile => ActionPayload::ReadFile {
            path: str_field(fields, &["path", "file", "filePath"]).ok_or_else(|| missing("path"))?,
        },
        ActionKind::WriteFile => ActionPayload::WriteFile {
            path: str_field(fields, &["path", "file", "filePath"]).ok_or_else(|| missing("path"))?,
            content: fields
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        ActionKind::WebSearch => {
            let query = str_field(fields, &["query", "q"])
                .or_else(|| (!description.is_empty()).then(|| description.to_string()))
                .ok_or_else(|| missing("query"))?;
            ActionPayload::WebSearch { query }
        }
        ActionKind::ExecuteCode => ActionPayload::ExecuteCode {
            code: fields
                .get("code")
                .and_then(Value::as_str)
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| missing("code"))?
                .to_string(),
            language: str_field(fields, &["language", "lang"])
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|| "python".to_string()),
        },
        ActionKind::CallApi => ActionPayload::CallApi {
            url: str_field(fields, &["url", "endpoint"]).ok_or_else(|| missing("url"))?,
            method: str_field(fields, &["method"])
                .map(|m| m.to_uppercase())
                .unwrap_or_else(|| "GET".to_string()),
            data: fields
                .get("data")
                .or_else(|| fields.get("body"))
                .cloned()
                .unwrap_or(Value::Null),
        },
    };
    Ok(parsed)
}
