//! Sequential execution of the step list
//!
//! Steps run strictly in order. Before a step runs it is gated:
//! 1. optional steps are skipped unless enabled
//! 2. auth steps are skipped when no credential was supplied
//! 3. auth steps fail `unauthorized` when the auth check rejected the key
//! 4. any other dependency that did not pass makes the step `skipped`
//!
//! A failing step never aborts the run; independent steps still execute.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::credential::Credential;
use super::matcher::CapabilityMatcher;
use super::outcome::{ErrorCode, VerificationOutcome};
use super::report::VerificationReport;
use super::sample::{check_not_degenerate, decode_vectors, AqedHeader, SampleError, AQED_HEADER_LEN};
use super::steps::{default_steps, StepId, VerificationStep};
use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.aqea.ai";

/// Default public dataset export (AQED, original embeddings)
pub const DEFAULT_DATA_URL: &str = "https://demo.aqea.ai/api/export/text-demo?file=embeddings_original";

/// Default number of sampled vectors
pub const DEFAULT_SAMPLE: usize = 8;

const BODY_SNIPPET: usize = 200;

/// Verifier run options
#[derive(Debug, Clone)]
pub struct VerifierOptions {
    pub base_url: String,
    pub data_url: String,
    pub sample: usize,
    /// Run the optional quantized-compression check
    pub quantized_check: bool,
    pub matcher: CapabilityMatcher,
    /// Environment variable name, quoted in skip messages
    pub api_key_env: String,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
            sample: DEFAULT_SAMPLE,
            quantized_check: false,
            matcher: CapabilityMatcher::default(),
            api_key_env: super::credential::DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

/// One model descriptor from capability discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub input_dim: usize,
}

/// Real vectors sampled from the dataset export
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub dim: usize,
    pub total: usize,
    pub vectors: Vec<Vec<f32>>,
    /// Model whose input dimension matches the sample
    pub model_id: String,
}

/// Data produced by earlier steps for later ones
#[derive(Debug, Default)]
struct RunState {
    outcomes: Vec<VerificationOutcome>,
    models: Option<Vec<ModelDescriptor>>,
    sample: Option<Sample>,
}

impl RunState {
    fn outcome(&self, step: StepId) -> Option<&VerificationOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }
}

/// Internal failure carried out of a step body
struct StepFailure {
    code: ErrorCode,
    message: String,
    http_status: Option<u16>,
    latency: Option<Duration>,
}

impl StepFailure {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: None,
            latency: None,
        }
    }

    fn from_response(code: ErrorCode, message: impl Into<String>, response: &HttpResponse) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: Some(response.status),
            latency: Some(response.elapsed),
        }
    }
}

impl From<TransportError> for StepFailure {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(limit) => Self {
                code: ErrorCode::Timeout,
                message: format!("no response within {:.1}s", limit.as_secs_f64()),
                http_status: None,
                latency: Some(limit),
            },
            TransportError::Unreachable(reason) => Self::new(ErrorCode::Unreachable, reason),
        }
    }
}

/// Successful step body result
struct StepSuccess {
    message: String,
    latency: Duration,
    http_status: Option<u16>,
    metrics: Vec<(&'static str, Value)>,
}

type StepResult = Result<StepSuccess, StepFailure>;

/// Drives the step list against a transport
pub struct ApiVerifier<T: Transport> {
    transport: T,
    options: VerifierOptions,
}

impl<T: Transport> ApiVerifier<T> {
    pub fn new(transport: T, options: VerifierOptions) -> Self {
        Self { transport, options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Run every step and return the report
    pub fn run(&self, credential: Option<&Credential>) -> VerificationReport {
        self.run_with(credential, |_| {})
    }

    /// Run every step, calling `on_outcome` as each outcome is recorded
    pub fn run_with<F>(&self, credential: Option<&Credential>, mut on_outcome: F) -> VerificationReport
    where
        F: FnMut(&VerificationOutcome),
    {
        let mut state = RunState::default();

        for step in default_steps() {
            let outcome = match self.gate(step, &state, credential) {
                Some(gated) => gated,
                None => self.execute(step, &mut state, credential),
            };
            info!(step = step.name(), status = outcome.status.label(), "step finished");
            on_outcome(&outcome);
            state.outcomes.push(outcome);
        }

        VerificationReport::from_outcomes(
            &self.options.base_url,
            &self.options.data_url,
            credential.is_some(),
            state.outcomes,
        )
    }

    fn gate(
        &self,
        step: &VerificationStep,
        state: &RunState,
        credential: Option<&Credential>,
    ) -> Option<VerificationOutcome> {
        if step.optional && !self.options.quantized_check {
            return Some(VerificationOutcome::skipped(
                step.id,
                step.target,
                "optional check not enabled",
            ));
        }

        if step.requires_auth && credential.is_none() {
            return Some(VerificationOutcome::skipped(
                step.id,
                step.target,
                format!("no credential supplied ({} not set)", self.options.api_key_env),
            ));
        }

        if step.requires_auth && step.id != StepId::AuthCheck {
            if let Some(auth) = state.outcome(StepId::AuthCheck) {
                if auth.error == Some(ErrorCode::Unauthorized) {
                    return Some(VerificationOutcome::failed(
                        step.id,
                        step.target,
                        ErrorCode::Unauthorized,
                        "credential was rejected by auth-check",
                    ));
                }
            }
        }

        for dep in step.depends_on {
            let passed = state
                .outcome(*dep)
                .map(|o| o.status == super::OutcomeStatus::Pass)
                .unwrap_or(false);
            if !passed {
                return Some(VerificationOutcome::skipped(
                    step.id,
                    step.target,
                    format!("requires {} which did not pass", dep),
                ));
            }
        }

        None
    }

    fn execute(
        &self,
        step: &VerificationStep,
        state: &mut RunState,
        credential: Option<&Credential>,
    ) -> VerificationOutcome {
        debug!(step = step.name(), target = step.target, "executing step");
        let result = match step.id {
            StepId::Liveness => self.check_liveness(),
            StepId::CapabilityDiscovery => self.discover_models(state),
            StepId::RealDataSampling => self.sample_real_data(state),
            StepId::AuthCheck => self.check_auth(credential),
            StepId::Compression => self.compress_batch(state, credential),
            StepId::QuantizedCompression => self.compress_quantized(state, credential),
        };

        match result {
            Ok(success) => {
                let mut outcome = VerificationOutcome::pass(step.id, step.target, success.message)
                    .with_latency(success.latency);
                if let Some(status) = success.http_status {
                    outcome = outcome.with_http_status(status);
                }
                for (key, value) in success.metrics {
                    outcome = outcome.with_metric(key, value);
                }
                outcome
            }
            Err(failure) => {
                let message = match credential {
                    Some(c) => c.redact(&failure.message),
                    None => failure.message,
                };
                warn!(step = step.name(), code = failure.code.as_str(), %message, "step failed");
                let mut outcome = VerificationOutcome::failed(step.id, step.target, failure.code, message);
                if let Some(status) = failure.http_status {
                    outcome = outcome.with_http_status(status);
                }
                if let Some(latency) = failure.latency {
                    outcome = outcome.with_latency(latency);
                }
                outcome
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.options.base_url.trim_end_matches('/'), path)
    }

    /// Map a non-success status to a failure; 401/403 are auth failures
    fn status_failure(&self, what: &str, response: &HttpResponse, credential: Option<&Credential>) -> StepFailure {
        let code = match response.status {
            401 | 403 => ErrorCode::Unauthorized,
            _ => ErrorCode::MalformedResponse,
        };
        let body = response.body_snippet(BODY_SNIPPET);
        let body = match credential {
            Some(c) => c.redact(&body),
            None => body,
        };
        StepFailure::from_response(
            code,
            format!("{} returned HTTP {} (body={:?})", what, response.status, body),
            response,
        )
    }

    fn parse_json(what: &str, response: &HttpResponse) -> Result<Value, StepFailure> {
        serde_json::from_slice(&response.body).map_err(|e| {
            StepFailure::from_response(
                ErrorCode::MalformedResponse,
                format!("{} returned invalid JSON: {}", what, e),
                response,
            )
        })
    }

    fn check_liveness(&self) -> StepResult {
        let response = self.transport.execute(&HttpRequest::get(self.url("/health")))?;
        if !response.is_success() {
            return Err(StepFailure::from_response(
                ErrorCode::Unreachable,
                format!("GET /health returned HTTP {}", response.status),
                &response,
            ));
        }
        Ok(StepSuccess {
            message: format!("HTTP {}", response.status),
            latency: response.elapsed,
            http_status: Some(response.status),
            metrics: Vec::new(),
        })
    }

    fn discover_models(&self, state: &mut RunState) -> StepResult {
        let what = "GET /api/v1/models";
        let response = self.transport.execute(&HttpRequest::get(self.url("/api/v1/models")))?;
        if !response.is_success() {
            return Err(self.status_failure(what, &response, None));
        }
        let payload = Self::parse_json(what, &response)?;
        let models = parse_models(&payload)
            .map_err(|reason| StepFailure::from_response(ErrorCode::SchemaViolation, reason, &response))?;

        let mut dims: Vec<usize> = models.iter().map(|m| m.input_dim).collect();
        dims.sort_unstable();
        dims.dedup();
        let message = format!("{} model(s), input dims {:?}", models.len(), dims);
        state.models = Some(models);

        Ok(StepSuccess {
            message,
            latency: response.elapsed,
            http_status: Some(response.status),
            metrics: vec![("model_count", json!(state.models.as_ref().map_or(0, Vec::len))), ("input_dims", json!(dims))],
        })
    }

    fn fetch_range(&self, start: u64, end: u64) -> Result<HttpResponse, StepFailure> {
        let request = HttpRequest::get(self.options.data_url.clone()).with_range(start, end);
        let response = self.transport.execute(&request)?;
        if response.status != 200 && response.status != 206 {
            return Err(StepFailure::from_response(
                ErrorCode::Unreachable,
                format!("dataset fetch returned HTTP {}", response.status),
                &response,
            ));
        }
        Ok(response)
    }

    fn sample_real_data(&self, state: &mut RunState) -> StepResult {
        let head = self.fetch_range(0, AQED_HEADER_LEN as u64 - 1)?;
        let header = AqedHeader::parse(&head.body)
            .map_err(|e| StepFailure::from_response(ErrorCode::MalformedResponse, e.to_string(), &head))?;

        let dim = header.original_dim as usize;
        let models = state.models.as_deref().unwrap_or(&[]);
        let model = models.iter().find(|m| m.input_dim == dim).ok_or_else(|| {
            let mut known: Vec<usize> = models.iter().map(|m| m.input_dim).collect();
            known.sort_unstable();
            known.dedup();
            StepFailure::from_response(
                ErrorCode::DimensionMismatch,
                format!("dataset dimension {} matches no discovered model (input dims {:?})", dim, known),
                &head,
            )
        })?;

        let take = header.take(self.options.sample);
        let chunk = self.fetch_range(0, header.prefix_len(take) as u64 - 1)?;
        let latency = head.elapsed + chunk.elapsed;
        let vectors = decode_vectors(&chunk.body, &header, take).map_err(|e| StepFailure {
            code: ErrorCode::MalformedResponse,
            message: e.to_string(),
            http_status: Some(chunk.status),
            latency: Some(latency),
        })?;

        if let Err(e) = check_not_degenerate(&vectors) {
            let message = match e {
                SampleError::Degenerate(reason) => reason,
                other => other.to_string(),
            };
            return Err(StepFailure {
                code: ErrorCode::DegenerateData,
                message,
                http_status: Some(chunk.status),
                latency: Some(latency),
            });
        }

        let sample = Sample {
            dim,
            total: header.count as usize,
            vectors,
            model_id: model.id.clone(),
        };
        let success = StepSuccess {
            message: format!("dim={}, n={} of {}, model={}", dim, take, sample.total, sample.model_id),
            latency,
            http_status: Some(chunk.status),
            metrics: vec![
                ("dimension", json!(dim)),
                ("sample_count", json!(take)),
                ("total_vectors", json!(sample.total)),
                ("model_id", json!(sample.model_id)),
            ],
        };
        state.sample = Some(sample);
        Ok(success)
    }

    fn check_auth(&self, credential: Option<&Credential>) -> StepResult {
        let what = "GET /api/v1/auth/verify";
        let credential = credential.ok_or_else(|| StepFailure::new(ErrorCode::Unauthorized, "no credential"))?;
        let request = HttpRequest::get(self.url("/api/v1/auth/verify")).with_credential(credential);
        let response = self.transport.execute(&request)?;
        if !response.is_success() {
            return Err(self.status_failure(what, &response, Some(credential)));
        }
        let payload = Self::parse_json(what, &response)?;
        if !payload.is_object() {
            return Err(StepFailure::from_response(
                ErrorCode::SchemaViolation,
                "auth response is not a JSON object",
                &response,
            ));
        }

        let mut metrics = Vec::new();
        let mut message = format!("HTTP {}", response.status);
        if payload.get("quota_used").is_some() || payload.get("quota_limit").is_some() {
            let used = payload.get("quota_used").cloned().unwrap_or(Value::Null);
            let limit = payload.get("quota_limit").cloned().unwrap_or(Value::Null);
            message = format!("quota used={} limit={}", used, limit);
            metrics.push(("quota_used", used));
            metrics.push(("quota_limit", limit));
        }
        Ok(StepSuccess {
            message,
            latency: response.elapsed,
            http_status: Some(response.status),
            metrics,
        })
    }

    fn compress_batch(&self, state: &RunState, credential: Option<&Credential>) -> StepResult {
        let what = "POST /api/v1/compress/batch";
        let credential = credential.ok_or_else(|| StepFailure::new(ErrorCode::Unauthorized, "no credential"))?;
        let sample = state
            .sample
            .as_ref()
            .ok_or_else(|| StepFailure::new(ErrorCode::SchemaViolation, "no sampled vectors available"))?;

        let body = json!({ "vectors": sample.vectors, "options": { "targetDims": 0 } });
        let request = HttpRequest::post_json(self.url("/api/v1/compress/batch"), body).with_credential(credential);
        let response = self.transport.execute(&request)?;
        if !response.is_success() {
            return Err(self.status_failure(what, &response, Some(credential)));
        }
        let payload = Self::parse_json(what, &response)?;
        let result = validate_batch_response(&payload, sample.vectors.len(), sample.dim)
            .map_err(|reason| StepFailure::from_response(ErrorCode::SchemaViolation, reason, &response))?;

        Ok(StepSuccess {
            message: format!(
                "out_dim={} ratio={} (input_dim={})",
                result.output_dim, result.compression_ratio, sample.dim
            ),
            latency: response.elapsed,
            http_status: Some(response.status),
            metrics: vec![
                ("input_dim", json!(sample.dim)),
                ("output_dim", json!(result.output_dim)),
                ("compression_ratio", json!(result.compression_ratio)),
                ("vectors", json!(sample.vectors.len())),
            ],
        })
    }

    fn compress_quantized(&self, state: &RunState, credential: Option<&Credential>) -> StepResult {
        let what = "POST /api/v1/compress-pq";
        let credential = credential.ok_or_else(|| StepFailure::new(ErrorCode::Unauthorized, "no credential"))?;
        let sample = state
            .sample
            .as_ref()
            .ok_or_else(|| StepFailure::new(ErrorCode::SchemaViolation, "no sampled vectors available"))?;
        let first = sample
            .vectors
            .first()
            .ok_or_else(|| StepFailure::new(ErrorCode::SchemaViolation, "sample is empty"))?;

        let body = json!({ "vector": first, "model": sample.model_id });
        let request = HttpRequest::post_json(self.url("/api/v1/compress-pq"), body).with_credential(credential);
        let response = self.transport.execute(&request)?;

        if !response.is_success() {
            if self.options.matcher.matches(response.status, &response.body) {
                return Err(StepFailure::from_response(
                    ErrorCode::CapabilityUnavailable,
                    format!(
                        "{} unavailable (HTTP {}): codebook missing for model {}",
                        what, response.status, sample.model_id
                    ),
                    &response,
                ));
            }
            return Err(self.status_failure(what, &response, Some(credential)));
        }

        let payload = Self::parse_json(what, &response)?;
        let codes = payload
            .get("codes")
            .and_then(Value::as_array)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                StepFailure::from_response(ErrorCode::SchemaViolation, "response has no 'codes' array", &response)
            })?;
        let meta = payload.get("metadata").cloned().unwrap_or(Value::Null);
        let quality = meta.get("expectedQuality").cloned().unwrap_or(Value::Null);
        let ratio = meta.get("compressionRatio").cloned().unwrap_or(Value::Null);

        Ok(StepSuccess {
            message: format!(
                "codes={} model={} expectedQuality={} ratio={}",
                codes.len(),
                sample.model_id,
                quality,
                ratio
            ),
            latency: response.elapsed,
            http_status: Some(response.status),
            metrics: vec![
                ("codes", json!(codes.len())),
                ("model_id", json!(sample.model_id)),
                ("expected_quality", quality),
                ("compression_ratio", ratio),
            ],
        })
    }
}

/// Parse `{"models": [{"id": .., "input_dim": ..}, ..]}`
pub fn parse_models(payload: &Value) -> Result<Vec<ModelDescriptor>, String> {
    let list = payload
        .get("models")
        .and_then(Value::as_array)
        .ok_or_else(|| "response has no 'models' array".to_string())?;
    if list.is_empty() {
        return Err("'models' array is empty".to_string());
    }
    list.iter()
        .enumerate()
        .map(|(i, m)| {
            let id = m
                .get("id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| format!("models[{}] has no 'id'", i))?;
            let input_dim = m
                .get("input_dim")
                .and_then(Value::as_u64)
                .filter(|d| *d > 0)
                .ok_or_else(|| format!("models[{}] has no positive 'input_dim'", i))?;
            Ok(ModelDescriptor {
                id: id.to_string(),
                input_dim: input_dim as usize,
            })
        })
        .collect()
}

/// Validated compression metrics
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub output_dim: usize,
    pub compression_ratio: f64,
}

/// Validate a batch-compress response against the request
pub fn validate_batch_response(payload: &Value, vectors: usize, input_dim: usize) -> Result<BatchResult, String> {
    let compressed = payload
        .get("compressed")
        .and_then(Value::as_array)
        .ok_or_else(|| "response has no 'compressed' array".to_string())?;
    let meta = payload
        .get("metadata")
        .filter(|m| m.is_object())
        .ok_or_else(|| "response has no 'metadata' object".to_string())?;

    if compressed.len() != vectors {
        return Err(format!(
            "expected {} compressed vectors, got {}",
            vectors,
            compressed.len()
        ));
    }
    let mut output_dim = None;
    for (i, row) in compressed.iter().enumerate() {
        let row = row
            .as_array()
            .ok_or_else(|| format!("compressed[{}] is not an array", i))?;
        if row.is_empty() || !row.iter().all(Value::is_number) {
            return Err(format!("compressed[{}] is empty or non-numeric", i));
        }
        match output_dim {
            None => output_dim = Some(row.len()),
            Some(d) if d != row.len() => {
                return Err(format!("compressed[{}] has {} dims, expected {}", i, row.len(), d))
            }
            Some(_) => {}
        }
    }
    let output_dim = output_dim.ok_or_else(|| "'compressed' array is empty".to_string())?;

    if let Some(declared) = meta.get("compressedDim").and_then(Value::as_u64) {
        if declared as usize != output_dim {
            return Err(format!(
                "metadata.compressedDim={} disagrees with vector length {}",
                declared, output_dim
            ));
        }
    }
    let compression_ratio = meta
        .get("compressionRatio")
        .and_then(Value::as_f64)
        .filter(|r| r.is_finite() && *r > 0.0)
        .ok_or_else(|| "metadata has no positive 'compressionRatio'".to_string())?;
    if output_dim >= input_dim {
        return Err(format!(
            "output dim {} is not smaller than input dim {}",
            output_dim, input_dim
        ));
    }

    Ok(BatchResult {
        output_dim,
        compression_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_models() {
        let payload = json!({"models": [{"id": "e5-large", "input_dim": 1024}, {"id": "oai-small", "input_dim": 1536}]});
        let models = parse_models(&payload).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[1], ModelDescriptor { id: "oai-small".to_string(), input_dim: 1536 });
    }

    #[test]
    fn test_parse_models_rejects_empty_and_missing() {
        assert!(parse_models(&json!({"models": []})).is_err());
        assert!(parse_models(&json!({"items": []})).is_err());
        assert!(parse_models(&json!([1, 2])).is_err());
        assert!(parse_models(&json!({"models": [{"id": "x"}]})).is_err());
    }

    #[test]
    fn test_validate_batch_ok() {
        let payload = json!({
            "compressed": [[0.1, 0.2], [0.3, 0.4]],
            "metadata": {"compressionRatio": 29.3, "originalDim": 4, "compressedDim": 2}
        });
        let r = validate_batch_response(&payload, 2, 4).unwrap();
        assert_eq!(r.output_dim, 2);
        assert_eq!(r.compression_ratio, 29.3);
    }

    #[test]
    fn test_validate_batch_requires_smaller_output() {
        let payload = json!({"compressed": [[0.1, 0.2]], "metadata": {"compressionRatio": 1.0}});
        let err = validate_batch_response(&payload, 1, 2).unwrap_err();
        assert!(err.contains("not smaller"));
    }

    #[test]
    fn test_validate_batch_schema_errors() {
        assert!(validate_batch_response(&json!({"compressed": [[0.1]]}), 1, 4).is_err());
        assert!(validate_batch_response(&json!({"metadata": {}}), 1, 4).is_err());
        let ragged = json!({"compressed": [[0.1], [0.1, 0.2]], "metadata": {"compressionRatio": 2.0}});
        assert!(validate_batch_response(&ragged, 2, 4).is_err());
        let no_ratio = json!({"compressed": [[0.1]], "metadata": {}});
        assert!(validate_batch_response(&no_ratio, 1, 4).is_err());
        let wrong_count = json!({"compressed": [[0.1]], "metadata": {"compressionRatio": 2.0}});
        assert!(validate_batch_response(&wrong_count, 3, 4).is_err());
    }
}
