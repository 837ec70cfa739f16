//! Core types and error definitions for the Maestro orchestration engine.
//!
//! This crate provides the foundational types shared across all Maestro crates,
//! including error handling, the fixed set of action kinds, and the autonomy
//! policy that decides which actions need a human sign-off.
//!
//! # Main types
//!
//! - [`MaestroError`]: Unified error enum for all Maestro subsystems.
//! - [`MaestroResult`]: Convenience alias for `Result<T, MaestroError>`.
//! - [`ActionKind`]: The kinds of executable step a task can be split into.
//! - [`approval::AutonomyLevel`]: Policy setting consulted by [`approval::requires_approval`].

/// Autonomy policy and approval types for human-in-the-loop dispatch.
pub mod approval;

pub use approval::{
    requires_approval, ApprovalChannel, ApprovalDecision, ApprovalRequest, AutonomyLevel,
    RiskLevel,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- Error types ---

/// Top-level error type for the Maestro engine.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// The reasoning oracle was unreachable or returned something unusable.
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// The action graph of a task contains a circular dependency.
    #[error("Dependency cycle detected at action '{action_id}'")]
    Cycle {
        /// The action that was reached while already on the DFS stack.
        action_id: String,
    },

    /// An action declares a dependency outside its own task.
    #[error("Action '{action_id}' depends on unknown action '{dependency_id}'")]
    UnknownDependency {
        /// The action holding the dangling reference.
        action_id: String,
        /// The referenced ID that does not exist in the task.
        dependency_id: String,
    },

    /// A worker registry operation was rejected.
    #[error("Registry error: {0}")]
    Registry(String),

    /// An action executor call failed.
    #[error("Executor error: {0}")]
    Executor(String),

    /// The learning store could not persist or load an entry.
    #[error("Memory error: {0}")]
    Memory(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A lifecycle status was asked to move backwards.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// An error from the orchestration pipeline itself.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

// --- Action kinds ---

/// The fixed set of executable step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Read a file's contents.
    ReadFile,
    /// Write content to a file.
    WriteFile,
    /// Run a web search query.
    WebSearch,
    /// Execute a code snippet.
    ExecuteCode,
    /// Call an external HTTP API.
    CallApi,
}

impl ActionKind {
    /// All kinds, in declaration order.
    pub const ALL: [ActionKind; 5] = [
        ActionKind::ReadFile,
        ActionKind::WriteFile,
        ActionKind::WebSearch,
        ActionKind::ExecuteCode,
        ActionKind::CallApi,
    ];

    /// The wire name used in oracle responses and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ReadFile => "read_file",
            ActionKind::WriteFile => "write_file",
            ActionKind::WebSearch => "web_search",
            ActionKind::ExecuteCode => "execute_code",
            ActionKind::CallApi => "call_api",
        }
    }

    /// Worker capabilities able to perform this kind of action.
    ///
    /// A worker can run the action if its capability set intersects this list.
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            ActionKind::ReadFile | ActionKind::WriteFile => &["file_management"],
            ActionKind::WebSearch => &["web_search"],
            ActionKind::ExecuteCode => &["code_execution"],
            ActionKind::CallApi => &["api_integration", "web_search"],
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = MaestroError;

    /// Accepts snake_case, kebab-case and camelCase spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "readfile" => Ok(ActionKind::ReadFile),
            "writefile" => Ok(ActionKind::WriteFile),
            "websearch" => Ok(ActionKind::WebSearch),
            "executecode" => Ok(ActionKind::ExecuteCode),
            "callapi" => Ok(ActionKind::CallApi),
            _ => Err(MaestroError::Oracle(format!("unknown action type '{s}'"))),
        }
    }
}
