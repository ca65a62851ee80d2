//! Verification report (the run's ordered outcome sequence)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outcome::{OutcomeStatus, VerificationOutcome};
use super::steps::STEP_LIST_VERSION;
use crate::exit::ExitCode;

/// Schema version for the verification report
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const REPORT_SCHEMA_ID: &str = "repro/verification_report@1";

/// Aggregate verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

/// Report for one verifier run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub step_list_version: u32,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub base_url: String,
    pub data_url: String,
    /// Whether a credential was present; the credential itself never is
    pub credential_supplied: bool,
    pub outcomes: Vec<VerificationOutcome>,
    pub status: RunStatus,
    pub exit_code: i32,
    pub passed: usize,
    pub soft_failed: usize,
    pub hard_failed: usize,
    pub skipped: usize,
}

impl VerificationReport {
    /// Aggregate an ordered outcome sequence
    pub fn from_outcomes(
        base_url: &str,
        data_url: &str,
        credential_supplied: bool,
        outcomes: Vec<VerificationOutcome>,
    ) -> Self {
        let count = |status: OutcomeStatus| outcomes.iter().filter(|o| o.status == status).count();
        let passed = count(OutcomeStatus::Pass);
        let soft_failed = count(OutcomeStatus::SoftFail);
        let hard_failed = count(OutcomeStatus::HardFail);
        let skipped = count(OutcomeStatus::Skipped);

        let (status, exit_code) = if hard_failed == 0 {
            (RunStatus::Passed, ExitCode::Success)
        } else {
            (RunStatus::Failed, ExitCode::VerificationFailed)
        };

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            schema_id: REPORT_SCHEMA_ID.to_string(),
            step_list_version: STEP_LIST_VERSION,
            run_id: ulid::Ulid::new().to_string(),
            created_at: Utc::now(),
            base_url: base_url.to_string(),
            data_url: data_url.to_string(),
            credential_supplied,
            outcomes,
            status,
            exit_code: exit_code.as_i32(),
            passed,
            soft_failed,
            hard_failed,
            skipped,
        }
    }

    pub fn has_hard_fail(&self) -> bool {
        self.hard_failed > 0
    }

    /// Exit code as enum
    pub fn exit_code_enum(&self) -> ExitCode {
        ExitCode::from_i32(self.exit_code).unwrap_or(ExitCode::VerificationFailed)
    }

    /// Outcome for a step, if it was recorded
    pub fn outcome(&self, step: super::StepId) -> Option<&VerificationOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }

    /// Closing line for human output
    pub fn summary_line(&self) -> String {
        let verdict = match self.status {
            RunStatus::Passed => "DONE: verification passed",
            RunStatus::Failed => "DONE: verification FAILED",
        };
        format!(
            "{} ({} passed, {} soft-failed, {} failed, {} skipped)",
            verdict, self.passed, self.soft_failed, self.hard_failed, self.skipped
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::{ErrorCode, StepId};

    fn outcomes(with_hard_fail: bool) -> Vec<VerificationOutcome> {
        let mut v = vec![
            VerificationOutcome::pass(StepId::Liveness, "GET /health", "ok"),
            VerificationOutcome::skipped(StepId::AuthCheck, "GET /api/v1/auth/verify", "no credential"),
            VerificationOutcome::failed(
                StepId::QuantizedCompression,
                "POST /api/v1/compress-pq",
                ErrorCode::CapabilityUnavailable,
                "codebook missing",
            ),
        ];
        if with_hard_fail {
            v.push(VerificationOutcome::failed(
                StepId::CapabilityDiscovery,
                "GET /api/v1/models",
                ErrorCode::MalformedResponse,
                "bad json",
            ));
        }
        v
    }

    #[test]
    fn test_soft_fail_and_skip_do_not_fail_run() {
        let report = VerificationReport::from_outcomes("http://x", "http://d", false, outcomes(false));
        assert_eq!(report.status, RunStatus::Passed);
        assert_eq!(report.exit_code, 0);
        assert_eq!(report.soft_failed, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_hard_fail_fails_run() {
        let report = VerificationReport::from_outcomes("http://x", "http://d", false, outcomes(true));
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code_enum(), ExitCode::VerificationFailed);
        assert!(report.summary_line().contains("FAILED"));
    }

    #[test]
    fn test_json_round_trip() {
        let report = VerificationReport::from_outcomes("http://x", "http://d", true, outcomes(false));
        let json = report.to_json().unwrap();
        assert!(json.contains(r#""schema_id": "repro/verification_report@1""#));
        assert!(json.contains(r#""credential_supplied": true"#));

        let parsed = VerificationReport::from_json(&json).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.outcomes, report.outcomes);
    }
}
