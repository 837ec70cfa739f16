//! Multi-agent task orchestration: classification, decomposition, DAG
//! scheduling and capability-based worker assignment.
//!
//! A free-form task description is classified and decomposed by an external
//! reasoning oracle into a graph of typed actions. The graph is ordered
//! topologically, matched against a pool of capability-tagged workers with
//! bounded load, executed concurrently through an abstract action executor,
//! and the outcome is written to a learning store.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Top-level engine exposing [`Orchestrator::submit`].
//! - [`WorkerRegistry`]: Worker pool with atomic load reservation.
//! - [`Coordinator`]: Worklist scheduler that runs a task's action graph.
//! - [`ReasoningOracle`]: External reasoning service used for classification and decomposition.
//! - [`ActionExecutor`]: External capability that performs the actions.

/// Worker selection for a task.
pub mod assigner;
/// Complexity classification with fail-soft defaults.
pub mod classifier;
/// Orchestrator configuration.
pub mod config;
/// Concurrent execution of an ordered action graph.
pub mod coordinator;
/// Oracle-driven task decomposition with a single-action fallback.
pub mod decomposer;
/// The orchestration engine and caller-facing surface.
pub mod engine;
/// Action executor boundary.
pub mod executor;
/// Cycle detection and topological ordering.
pub mod graph;
/// Reasoning oracle boundary and response validation.
pub mod oracle;
/// Default worker pool.
pub mod profiles;
/// Outcome persistence to the learning store.
pub mod recorder;
/// Worker pool with bounded load counters.
pub mod registry;
/// Shared orchestration types (Task, Action, Worker, ExecutionRecord, etc.).
pub mod types;

pub use assigner::{assign, required_capabilities};
pub use classifier::ComplexityClassifier;
pub use config::{OrchestratorConfig, ReservationMode};
pub use coordinator::Coordinator;
pub use decomposer::{Decomposition, TaskDecomposer};
pub use engine::{Orchestrator, SubmitOptions, SubmitResponse, TaskPlan};
pub use executor::{dispatch, ActionExecutor};
pub use graph::{build_execution_order, has_cycle};
pub use oracle::{
    ClassificationOutcome, DecompositionOutcome, OracleError, ProposedAction, ReasoningOracle,
};
pub use profiles::default_workers;
pub use recorder::OutcomeRecorder;
pub use registry::WorkerRegistry;
pub use types::{
    Action, ActionOutcome, ActionPayload, ActionState, ApprovalStatus, Complexity, DependencyEdge,
    ExecutionRecord, Priority, Task, TaskStatus, Worker, WorkerRole, WorkerStatus,
};
