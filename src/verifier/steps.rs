//! The fixed, versioned list of verification steps

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the step list; bump when steps or dependencies change
pub const STEP_LIST_VERSION: u32 = 1;

/// Step identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    Liveness,
    CapabilityDiscovery,
    RealDataSampling,
    AuthCheck,
    Compression,
    QuantizedCompression,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Liveness => "liveness",
            StepId::CapabilityDiscovery => "capability-discovery",
            StepId::RealDataSampling => "real-data-sampling",
            StepId::AuthCheck => "auth-check",
            StepId::Compression => "compression",
            StepId::QuantizedCompression => "quantized-compression",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the step list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationStep {
    pub id: StepId,
    /// Endpoint or operation exercised, for display
    pub target: &'static str,
    pub requires_auth: bool,
    /// Optional steps never affect the exit code through soft-fails
    pub optional: bool,
    /// Steps whose success this step needs; a dependency that did not
    /// pass makes this step `skipped`
    pub depends_on: &'static [StepId],
}

impl VerificationStep {
    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }
}

const STEPS: [VerificationStep; 6] = [
    VerificationStep {
        id: StepId::Liveness,
        target: "GET /health",
        requires_auth: false,
        optional: false,
        depends_on: &[],
    },
    VerificationStep {
        id: StepId::CapabilityDiscovery,
        target: "GET /api/v1/models",
        requires_auth: false,
        optional: false,
        depends_on: &[],
    },
    VerificationStep {
        id: StepId::RealDataSampling,
        target: "GET <data-url> (AQED export)",
        requires_auth: false,
        optional: false,
        depends_on: &[StepId::CapabilityDiscovery],
    },
    VerificationStep {
        id: StepId::AuthCheck,
        target: "GET /api/v1/auth/verify",
        requires_auth: true,
        optional: false,
        depends_on: &[],
    },
    VerificationStep {
        id: StepId::Compression,
        target: "POST /api/v1/compress/batch",
        requires_auth: true,
        optional: false,
        depends_on: &[StepId::AuthCheck, StepId::RealDataSampling],
    },
    VerificationStep {
        id: StepId::QuantizedCompression,
        target: "POST /api/v1/compress-pq",
        requires_auth: true,
        optional: true,
        depends_on: &[
            StepId::AuthCheck,
            StepId::CapabilityDiscovery,
            StepId::RealDataSampling,
        ],
    },
];

/// The step list, in execution order
pub fn default_steps() -> &'static [VerificationStep] {
    &STEPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_precede_dependents() {
        let steps = default_steps();
        for (i, step) in steps.iter().enumerate() {
            for dep in step.depends_on {
                let pos = steps.iter().position(|s| s.id == *dep).unwrap();
                assert!(pos < i, "{} depends on later step {}", step.id, dep);
            }
        }
    }

    #[test]
    fn test_names_are_unique() {
        let steps = default_steps();
        let mut names: Vec<_> = steps.iter().map(|s| s.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), steps.len());
    }

    #[test]
    fn test_auth_steps() {
        let auth: Vec<_> = default_steps()
            .iter()
            .filter(|s| s.requires_auth)
            .map(|s| s.id)
            .collect();
        assert_eq!(
            auth,
            vec![StepId::AuthCheck, StepId::Compression, StepId::QuantizedCompression]
        );
    }

    #[test]
    fn test_only_quantized_is_optional() {
        let optional: Vec<_> = default_steps().iter().filter(|s| s.optional).collect();
        assert_eq!(optional.len(), 1);
        assert_eq!(optional[0].id, StepId::QuantizedCompression);
    }

    #[test]
    fn test_step_id_serialization() {
        let json = serde_json::to_string(&StepId::RealDataSampling).unwrap();
        assert_eq!(json, "\"real-data-sampling\"");
    }
}
