#![allow(clippy::unwrap_used, clippy::expect_used)]

use maestro_core::*;

// ---------------------------------------------------------------------------
// 1. Approval request serialization
// ---------------------------------------------------------------------------

#[test]
fn approval_request_serialization_roundtrip() {
    let request = ApprovalRequest {
        task_id: "8c1d".to_string(),
        action_id: "8c1d_action_0".to_string(),
        kind: ActionKind::ExecuteCode,
        description: "Run the migration script".to_string(),
        risk_level: RiskLevel::for_kind(ActionKind::ExecuteCode),
        context: "python: print(1)".to_string(),
    };

    let json = serde_json::to_string(&request).unwrap();
    assert!(json.contains("\"execute_code\""));
    assert!(json.contains("\"critical\""));

    let parsed: ApprovalRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.action_id, "8c1d_action_0");
    assert_eq!(parsed.kind, ActionKind::ExecuteCode);
}

// ---------------------------------------------------------------------------
// 2. Error conversions
// ---------------------------------------------------------------------------

#[test]
fn json_error_converts_into_maestro_error() {
    fn parse(raw: &str) -> MaestroResult<serde_json::Value> {
        Ok(serde_json::from_str(raw)?)
    }

    let err = parse("{not json").unwrap_err();
    assert!(matches!(err, MaestroError::Json(_)));
    assert!(err.to_string().starts_with("JSON error"));
}

#[test]
fn io_error_converts_into_maestro_error() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: MaestroError = io.into();
    assert!(matches!(err, MaestroError::Io(_)));
}

// ---------------------------------------------------------------------------
// 3. Autonomy policy is monotonic
// ---------------------------------------------------------------------------

#[test]
fn higher_autonomy_never_requires_more_approvals() {
    for kind in ActionKind::ALL {
        let low = requires_approval(kind, AutonomyLevel::Low);
        let medium = requires_approval(kind, AutonomyLevel::Medium);
        let high = requires_approval(kind, AutonomyLevel::High);
        assert!(low || !medium, "{kind}: medium gated but low not");
        assert!(medium || !high, "{kind}: high gated but medium not");
    }
}
