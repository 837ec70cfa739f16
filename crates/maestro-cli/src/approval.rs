use async_trait::async_trait;
use maestro_core::{ApprovalChannel, ApprovalDecision, ApprovalRequest, MaestroResult, RiskLevel};
use std::time::Duration;
use tracing::info;

/// Terminal reviewer: prints each gated action to stderr and reads a verdict
/// from stdin. Silence past the timeout counts as a denial.
pub struct StdinApprovalChannel {
    timeout: Duration,
}

impl StdinApprovalChannel {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for StdinApprovalChannel {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

/// ANSI color code and label for a risk level.
pub fn risk_style(level: RiskLevel) -> (&'static str, &'static str) {
    match level {
        RiskLevel::Low => ("32", "LOW"),
        RiskLevel::Medium => ("36", "MEDIUM"),
        RiskLevel::High => ("33", "HIGH"),
        RiskLevel::Critical => ("1;31", "CRITICAL"),
    }
}

/// Render the prompt shown to the reviewer.
pub fn render_prompt(request: &ApprovalRequest) -> String {
    let (color, label) = risk_style(request.risk_level);
    let mut prompt = String::from("\n\x1b[1;37m-- approval needed --\x1b[0m\n");
    prompt.push_str(&format!("  action:  {} ({})\n", request.action_id, request.kind));
    prompt.push_str(&format!("  task:    {}\n", request.task_id));
    prompt.push_str(&format!("  risk:    \x1b[{color}m{label}\x1b[0m\n"));
    prompt.push_str(&format!("  what:    {}\n", request.description));
    if !request.context.is_empty() {
        prompt.push_str(&format!("  payload: {}\n", request.context));
    }
    prompt.push_str("  run it? [y/N or a reason to deny]: ");
    prompt
}

/// Interpret a reviewer's line. Anything other than yes denies; free text
/// becomes the denial reason.
pub fn parse_verdict(input: &str) -> (bool, Option<String>) {
    let trimmed = input.trim();
    match trimmed.to_lowercase().as_str() {
        "y" | "yes" => (true, None),
        "" | "n" | "no" => (false, None),
        _ => (false, Some(trimmed.to_string())),
    }
}

fn reviewer_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "cli-user".to_string())
}

#[async_trait]
impl ApprovalChannel for StdinApprovalChannel {
    async fn request_approval(&self, request: ApprovalRequest) -> MaestroResult<ApprovalDecision> {
        eprint!("{}", render_prompt(&request));

        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        });
        let (approved, reason) = match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(Ok(line))) => parse_verdict(&line),
            Ok(_) => (false, Some("could not read stdin".to_string())),
            Err(_) => (
                false,
                Some(format!("no answer within {}s", self.timeout.as_secs())),
            ),
        };

        eprintln!("  -> {}\n", if approved { "approved" } else { "denied" });
        info!(action_id = %request.action_id, approved, "Reviewer decision");
        Ok(ApprovalDecision {
            approved,
            reason,
            reviewer: reviewer_name(),
        })
    }
}
