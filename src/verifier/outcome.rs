//! Per-step outcomes and the verifier's error taxonomy

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::steps::StepId;

/// Outcome status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Pass,
    /// Optional capability unavailable; excluded from the verdict
    SoftFail,
    HardFail,
    /// Not attempted: no credential, disabled, or a dependency did not pass
    Skipped,
}

impl OutcomeStatus {
    /// Fixed-width prefix for progress lines
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Pass => "PASS",
            OutcomeStatus::SoftFail => "SOFT",
            OutcomeStatus::HardFail => "FAIL",
            OutcomeStatus::Skipped => "SKIP",
        }
    }
}

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Network,
    Protocol,
    Auth,
    DataIntegrity,
    CapabilityUnavailable,
}

/// Error code attached to a non-passing outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unreachable,
    Timeout,
    MalformedResponse,
    SchemaViolation,
    Unauthorized,
    CapabilityUnavailable,
    DegenerateData,
    DimensionMismatch,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unreachable => "unreachable",
            ErrorCode::Timeout => "timeout",
            ErrorCode::MalformedResponse => "malformed-response",
            ErrorCode::SchemaViolation => "schema-violation",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::CapabilityUnavailable => "capability-unavailable",
            ErrorCode::DegenerateData => "degenerate-data",
            ErrorCode::DimensionMismatch => "dimension-mismatch",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::Unreachable | ErrorCode::Timeout => ErrorCategory::Network,
            ErrorCode::MalformedResponse | ErrorCode::SchemaViolation => ErrorCategory::Protocol,
            ErrorCode::Unauthorized => ErrorCategory::Auth,
            ErrorCode::DegenerateData | ErrorCode::DimensionMismatch => ErrorCategory::DataIntegrity,
            ErrorCode::CapabilityUnavailable => ErrorCategory::CapabilityUnavailable,
        }
    }

    /// Whether this code downgrades the run to failing
    pub fn fails_run(&self) -> bool {
        !matches!(self, ErrorCode::CapabilityUnavailable)
    }
}

/// Result of one executed (or skipped) step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub step: StepId,

    /// Endpoint or operation exercised
    pub target: String,

    pub status: OutcomeStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,

    /// HTTP status of the deciding response, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    /// Wall-clock latency of the step's requests in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,

    /// Diagnostic message; never contains the credential
    pub message: String,

    /// Extracted metrics (dimension, compression ratio, quota, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

fn millis(d: Duration) -> f64 {
    (d.as_secs_f64() * 10_000.0).round() / 10.0
}

impl VerificationOutcome {
    fn new(step: StepId, target: &str, status: OutcomeStatus, message: String) -> Self {
        Self {
            step,
            target: target.to_string(),
            status,
            error: None,
            category: None,
            http_status: None,
            latency_ms: None,
            message,
            metrics: BTreeMap::new(),
        }
    }

    pub fn pass(step: StepId, target: &str, message: impl Into<String>) -> Self {
        Self::new(step, target, OutcomeStatus::Pass, message.into())
    }

    pub fn skipped(step: StepId, target: &str, reason: impl Into<String>) -> Self {
        Self::new(step, target, OutcomeStatus::Skipped, reason.into())
    }

    /// A failed step; the status follows from the code
    pub fn failed(step: StepId, target: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        let status = if code.fails_run() {
            OutcomeStatus::HardFail
        } else {
            OutcomeStatus::SoftFail
        };
        let mut outcome = Self::new(step, target, status, message.into());
        outcome.error = Some(code);
        outcome.category = Some(code.category());
        outcome
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(millis(latency));
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    pub fn is_hard_fail(&self) -> bool {
        self.status == OutcomeStatus::HardFail
    }

    /// One progress line: `<STATUS>  <step>  <target>  (<ms>)  <message>`
    pub fn progress_line(&self) -> String {
        let mut line = format!("{}  {}  {}", self.status.label(), self.step, self.target);
        if let Some(ms) = self.latency_ms {
            line.push_str(&format!("  ({:.1}ms)", ms));
        }
        if let Some(code) = self.error {
            line.push_str(&format!("  [{}]", code.as_str()));
        }
        if !self.message.is_empty() {
            line.push_str("  ");
            line.push_str(&self.message);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_unavailable_is_soft() {
        let o = VerificationOutcome::failed(
            StepId::QuantizedCompression,
            "POST /api/v1/compress-pq",
            ErrorCode::CapabilityUnavailable,
            "codebook missing",
        );
        assert_eq!(o.status, OutcomeStatus::SoftFail);
        assert_eq!(o.category, Some(ErrorCategory::CapabilityUnavailable));
        assert!(!o.is_hard_fail());
    }

    #[test]
    fn test_other_codes_are_hard() {
        for code in [
            ErrorCode::Unreachable,
            ErrorCode::Timeout,
            ErrorCode::MalformedResponse,
            ErrorCode::SchemaViolation,
            ErrorCode::Unauthorized,
            ErrorCode::DegenerateData,
            ErrorCode::DimensionMismatch,
        ] {
            let o = VerificationOutcome::failed(StepId::Liveness, "GET /health", code, "x");
            assert_eq!(o.status, OutcomeStatus::HardFail, "{}", code.as_str());
        }
    }

    #[test]
    fn test_categories() {
        assert_eq!(ErrorCode::Timeout.category(), ErrorCategory::Network);
        assert_eq!(ErrorCode::SchemaViolation.category(), ErrorCategory::Protocol);
        assert_eq!(ErrorCode::Unauthorized.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::DegenerateData.category(), ErrorCategory::DataIntegrity);
    }

    #[test]
    fn test_progress_line() {
        let o = VerificationOutcome::pass(StepId::Liveness, "GET /health", "HTTP 200")
            .with_latency(Duration::from_micros(12_345));
        assert_eq!(o.progress_line(), "PASS  liveness  GET /health  (12.3ms)  HTTP 200");

        let f = VerificationOutcome::failed(StepId::CapabilityDiscovery, "GET /api/v1/models", ErrorCode::MalformedResponse, "bad json");
        assert_eq!(
            f.progress_line(),
            "FAIL  capability-discovery  GET /api/v1/models  [malformed-response]  bad json"
        );
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let o = VerificationOutcome::skipped(StepId::AuthCheck, "GET /api/v1/auth/verify", "no credential");
        let json = serde_json::to_string(&o).unwrap();
        assert!(json.contains(r#""status":"skipped""#));
        assert!(!json.contains("metrics"));
        assert!(!json.contains("error"));
    }
}
