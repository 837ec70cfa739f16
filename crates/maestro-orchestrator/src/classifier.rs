use crate::oracle::{parse_classification, ClassificationOutcome, OracleError, ReasoningOracle};
use crate::types::Complexity;
use std::sync::Arc;
use tracing::{info, warn};

/// Estimates a task's complexity, duration and required capabilities.
///
/// Never fails: an unreachable oracle or an unusable reply yields
/// [`ComplexityClassifier::fallback`].
pub struct ComplexityClassifier {
    oracle: Arc<dyn ReasoningOracle>,
    default_duration_secs: u64,
}

impl ComplexityClassifier {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, default_duration_secs: u64) -> Self {
        Self {
            oracle,
            default_duration_secs,
        }
    }

    /// Classify `text`, falling back to a conservative default on any oracle problem.
    pub async fn classify(&self, text: &str, context: &[String]) -> ClassificationOutcome {
        match self.try_classify(text, context).await {
            Ok(outcome) => {
                info!(
                    complexity = %outcome.complexity,
                    estimated_secs = outcome.estimated_duration_secs,
                    capabilities = ?outcome.required_capabilities,
                    "Task classified"
                );
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Classification failed, using default");
                self.fallback()
            }
        }
    }

    /// Classify without the fallback, exposing why the oracle answer was rejected.
    pub async fn try_classify(
        &self,
        text: &str,
        context: &[String],
    ) -> Result<ClassificationOutcome, OracleError> {
        let reply = self
            .oracle
            .ask(&classification_prompt(text, context))
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        parse_classification(&reply)
    }

    /// `simple`, the default duration, no capabilities.
    pub fn fallback(&self) -> ClassificationOutcome {
        ClassificationOutcome {
            complexity: Complexity::Simple,
            estimated_duration_secs: self.default_duration_secs,
            required_capabilities: Vec::new(),
        }
    }
}

fn classification_prompt(text: &str, context: &[String]) -> String {
    let mut prompt = String::from(
        "Classify the following task for a multi-agent execution engine.\n\n",
    );
    prompt.push_str(&format!("Task: {text}\n"));
    if !context.is_empty() {
        prompt.push_str("\nContext:\n");
        for line in context {
            prompt.push_str(&format!("- {line}\n"));
        }
    }
    prompt.push_str(
        "\nRespond with a single JSON object and nothing else:\n\
         {\"complexity\": \"simple\" | \"complex\" | \"coordination\", \
         \"estimatedDuration\": <seconds>, \
         \"requiredCapabilities\": [\"file_management\" | \"web_search\" | \"code_execution\" | \"api_integration\"]}\n",
    );
    prompt
}
