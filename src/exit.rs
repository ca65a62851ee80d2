//! Stable process exit codes

use serde::{Deserialize, Serialize};

/// Exit codes shared by every subcommand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Everything checked out
    #[default]
    Success = 0,
    /// A check ran and failed (hard-fail, drift, failed figure)
    VerificationFailed = 1,
    /// Bad arguments or configuration
    Usage = 2,
    /// Filesystem or other local I/O failure
    Io = 3,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::VerificationFailed),
            2 => Some(ExitCode::Usage),
            3 => Some(ExitCode::Io),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Worst of two codes; I/O beats usage beats verification failure
    pub fn worst(self, other: ExitCode) -> ExitCode {
        fn rank(code: ExitCode) -> u8 {
            match code {
                ExitCode::Success => 0,
                ExitCode::VerificationFailed => 1,
                ExitCode::Usage => 2,
                ExitCode::Io => 3,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

impl From<&repro_manifest::ManifestError> for ExitCode {
    fn from(err: &repro_manifest::ManifestError) -> Self {
        use repro_manifest::ManifestError;
        match err {
            ManifestError::MissingRequired(_) | ManifestError::Parse { .. } => ExitCode::VerificationFailed,
            ManifestError::NotADirectory(_) | ManifestError::Exclude(_) => ExitCode::Usage,
            _ => ExitCode::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_values() {
        for code in [ExitCode::Success, ExitCode::VerificationFailed, ExitCode::Usage, ExitCode::Io] {
            assert_eq!(ExitCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ExitCode::from_i32(42), None);
    }

    #[test]
    fn test_worst() {
        assert_eq!(ExitCode::Success.worst(ExitCode::VerificationFailed), ExitCode::VerificationFailed);
        assert_eq!(ExitCode::Io.worst(ExitCode::Usage), ExitCode::Io);
        assert_eq!(ExitCode::default(), ExitCode::Success);
    }

    #[test]
    fn test_manifest_error_codes() {
        use repro_manifest::ManifestError;
        let missing = ManifestError::MissingRequired("data/a.json".to_string());
        assert_eq!(ExitCode::from(&missing), ExitCode::VerificationFailed);
        let not_dir = ManifestError::NotADirectory("x".to_string());
        assert_eq!(ExitCode::from(&not_dir), ExitCode::Usage);
        let io = ManifestError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(ExitCode::from(&io), ExitCode::Io);
    }
}
