//! Approval types for human-in-the-loop dispatch.
//!
//! These types live in `maestro-core` so that the orchestrator (which decides
//! when an action needs sign-off) and the CLI (which implements an interactive
//! channel) can share them without circular deps.

use crate::{ActionKind, MaestroResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much the engine may do without asking a human first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    /// Anything that mutates state or reaches outside needs approval.
    Low,
    /// Only arbitrary code execution needs approval.
    #[default]
    Medium,
    /// Nothing needs approval.
    High,
}

impl AutonomyLevel {
    /// Parse a level name, falling back to [`AutonomyLevel::Medium`].
    pub fn parse_level(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => AutonomyLevel::Low,
            "high" => AutonomyLevel::High,
            _ => AutonomyLevel::Medium,
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutonomyLevel::Low => write!(f, "low"),
            AutonomyLevel::Medium => write!(f, "medium"),
            AutonomyLevel::High => write!(f, "high"),
        }
    }
}

/// Whether an action of `kind` must be approved before dispatch under `level`.
///
/// Reads and searches never need approval.
pub fn requires_approval(kind: ActionKind, level: AutonomyLevel) -> bool {
    match (level, kind) {
        (_, ActionKind::ReadFile | ActionKind::WebSearch) => false,
        (AutonomyLevel::Low, _) => true,
        (AutonomyLevel::Medium, ActionKind::ExecuteCode) => true,
        (AutonomyLevel::Medium, _) => false,
        (AutonomyLevel::High, _) => false,
    }
}

/// Risk level shown to the reviewer of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Default risk for an action kind.
    pub fn for_kind(kind: ActionKind) -> Self {
        match kind {
            ActionKind::ReadFile | ActionKind::WebSearch => RiskLevel::Low,
            ActionKind::CallApi => RiskLevel::Medium,
            ActionKind::WriteFile => RiskLevel::High,
            ActionKind::ExecuteCode => RiskLevel::Critical,
        }
    }
}

/// A request sent to a human reviewer for approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub task_id: String,
    pub action_id: String,
    pub kind: ActionKind,
    pub description: String,
    pub risk_level: RiskLevel,
    /// Rendered payload, for the reviewer's benefit.
    pub context: String,
}

/// The decision made by a human reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub reason: Option<String>,
    pub reviewer: String,
}

/// Channel through which approval requests are sent and decisions are received.
/// Implementations can be CLI prompts, WebSocket handlers, chat bots, etc.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> MaestroResult<ApprovalDecision>;
}
