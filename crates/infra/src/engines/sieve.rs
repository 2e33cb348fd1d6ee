use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use application::interfaces::separation_engine::{
    DispatchOutcome, EngineJobState, EngineJobStatus, EngineOutputFile, SeparationEngineClient,
    SubmitRequest,
};

#[derive(Debug, Clone)]
pub struct SieveEngineConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

/// Client for the Sieve-hosted Demucs separation service, built on reqwest.
pub struct SieveEngineClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    audio_url: &'a str,
    model: &'a str,
    // The service predates optional fields and expects the literal string
    // "None" when two-stem mode is off.
    two_stems: &'a str,
    overlap: f64,
    shifts: i32,
    audio_format: &'a str,
}

impl<'a> SubmitBody<'a> {
    fn from_request(request: &'a SubmitRequest) -> Self {
        Self {
            audio_url: &request.audio_url,
            model: &request.model,
            two_stems: request.two_stems.as_deref().unwrap_or("None"),
            overlap: request.overlap,
            shifts: request.shifts,
            audio_format: &request.audio_format,
        }
    }
}

/// The result field arrives as one object for two-stem runs and as a list
/// otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultPayload {
    Many(Vec<EngineOutputFile>),
    One(EngineOutputFile),
}

impl ResultPayload {
    fn into_files(self) -> Vec<EngineOutputFile> {
        match self {
            ResultPayload::Many(files) => files,
            ResultPayload::One(file) => vec![file],
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    status: Option<String>,
    job_id: Option<String>,
    #[serde(default)]
    output_files: Option<Vec<EngineOutputFile>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Option<String>,
    progress: Option<i32>,
    #[serde(default)]
    result: Option<ResultPayload>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    detail: Option<String>,
}

fn dispatch_outcome(response: SubmitResponse) -> Result<DispatchOutcome> {
    let state = EngineJobState::from_engine(response.status.as_deref().unwrap_or_default());
    if state == EngineJobState::Failed {
        anyhow::bail!(
            "engine rejected the separation request: {}",
            response
                .error
                .unwrap_or_else(|| "no error details".to_string())
        );
    }

    if let Some(output_files) = response.output_files {
        return Ok(DispatchOutcome::Completed { output_files });
    }

    if let Some(engine_job_id) = response.job_id {
        return Ok(DispatchOutcome::Accepted { engine_job_id });
    }

    anyhow::bail!("engine response carried neither output files nor a job id")
}

fn job_status(response: StatusResponse) -> EngineJobStatus {
    EngineJobStatus {
        state: EngineJobState::from_engine(response.status.as_deref().unwrap_or_default()),
        progress: response.progress,
        output_files: response
            .result
            .map(ResultPayload::into_files)
            .unwrap_or_default(),
        error: response.error,
    }
}

impl SieveEngineClient {
    pub fn new(config: SieveEngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build separation engine http client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let detail = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.detail);

        error!(
            status = %status,
            engine_error_detail = ?detail,
            response_body = %body,
            context = %context,
            "engine api request failed"
        );

        anyhow::bail!("engine API request failed: {} (status {})", context, status);
    }
}

#[async_trait]
impl SeparationEngineClient for SieveEngineClient {
    async fn submit(&self, request: SubmitRequest) -> Result<DispatchOutcome> {
        let resp = self
            .http
            .post(format!("{}/separate", self.base_url))
            .header("X-API-Key", &self.api_key)
            .json(&SubmitBody::from_request(&request))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "submit separation").await?;

        let parsed: SubmitResponse = resp.json().await?;
        dispatch_outcome(parsed)
    }

    async fn fetch_status(&self, engine_job_id: &str) -> Result<EngineJobStatus> {
        let resp = self
            .http
            .get(format!("{}/status/{}", self.base_url, engine_job_id))
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "fetch separation status").await?;

        let parsed: StatusResponse = resp.json().await?;
        Ok(job_status(parsed))
    }
}
