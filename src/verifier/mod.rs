//! Remote API verification
//!
//! Runs a fixed, ordered list of HTTP checks against the compression
//! service using real vectors from a public dataset export, and records
//! one outcome per step. Public checks need no credential; authenticated
//! checks are skipped, not failed, when no key is supplied.

mod credential;
mod matcher;
mod outcome;
mod report;
mod runner;
mod sample;
mod steps;
mod transport;

pub use credential::{Credential, API_KEY_HEADER, DEFAULT_API_KEY_ENV};
pub use matcher::{CapabilityMatcher, MatcherConfig};
pub use outcome::{ErrorCategory, ErrorCode, OutcomeStatus, VerificationOutcome};
pub use report::{RunStatus, VerificationReport, REPORT_SCHEMA_ID, REPORT_SCHEMA_VERSION};
pub use runner::{
    parse_models, validate_batch_response, ApiVerifier, BatchResult, ModelDescriptor, Sample,
    VerifierOptions, DEFAULT_BASE_URL, DEFAULT_DATA_URL, DEFAULT_SAMPLE,
};
pub use sample::{
    check_not_degenerate, decode_vectors, encode_aqed, AqedHeader, SampleError, AQED_HEADER_LEN,
    AQED_MAGIC, AQED_VERSION, FLAG_HAS_COMPRESSED, FLAG_HAS_ORIGINAL,
};
pub use steps::{default_steps, StepId, VerificationStep, STEP_LIST_VERSION};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, MockReply, MockTransport, RecordedRequest,
    Transport, TransportError,
};
