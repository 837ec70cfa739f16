use crate::types::{Worker, WorkerRole};

/// Default worker pool.
/// One generalist coordinator plus executors and specialists covering each capability.
pub fn default_workers() -> Vec<Worker> {
    vec![
        coordinator(),
        file_executor(),
        research_specialist(),
        code_executor(),
        integration_specialist(),
    ]
}

fn coordinator() -> Worker {
    Worker::new(
        "coordinator",
        WorkerRole::Coordinator,
        [
            "file_management",
            "web_search",
            "code_execution",
            "api_integration",
        ],
        3,
    )
}

fn file_executor() -> Worker {
    Worker::new("file-executor", WorkerRole::Executor, ["file_management"], 2)
}

fn research_specialist() -> Worker {
    Worker::new(
        "research-specialist",
        WorkerRole::Specialist,
        ["web_search", "api_integration"],
        2,
    )
}

fn code_executor() -> Worker {
    Worker::new("code-executor", WorkerRole::Executor, ["code_execution"], 1)
}

fn integration_specialist() -> Worker {
    Worker::new(
        "integration-specialist",
        WorkerRole::Specialist,
        ["api_integration"],
        2,
    )
}
