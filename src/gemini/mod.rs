pub mod file_search;
pub mod generate;
pub mod operations;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for the Gemini REST API, built per session from the
/// user's credential and the server configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub poll_interval: Duration,
    pub upload_timeout: Duration,
    pub size_warning_bytes: u64,
}

impl GeminiConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: operations::DEFAULT_POLL_INTERVAL,
            upload_timeout: operations::UPLOAD_MAX_WAIT,
            size_warning_bytes: file_search::SIZE_WARNING_BYTES,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn upload_url(&self, path: &str) -> String {
        format!(
            "{}/upload/v1beta/{}",
            self.base_url.trim_end_matches('/'),
            path
        )
    }
}

/// The generative models a session may select from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Model {
    #[default]
    #[serde(rename = "gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "gemini-2.5-pro")]
    Gemini25Pro,
}

impl Model {
    pub const ALL: [Model; 2] = [Model::Gemini25Flash, Model::Gemini25Pro];

    pub fn id(&self) -> &'static str {
        match self {
            Model::Gemini25Flash => "gemini-2.5-flash",
            Model::Gemini25Pro => "gemini-2.5-pro",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Model {
    type Err = GeminiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| GeminiError::Parse(format!("Unknown model: {}", s)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Operation timed out after {}s", waited.as_secs())]
    Timeout { waited: Duration },
    #[error("Operation failed: {code} - {message}")]
    Operation { code: i32, message: String },
    #[error("Upload session did not return an upload URL")]
    MissingUploadUrl,
    #[error("Model returned no answer text")]
    EmptyAnswer,
}

/// How an upload failure is presented to the user. Every kind is terminal for
/// the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailureKind {
    Timeout,
    Rejected,
    Other,
}

// google.rpc.Code values that mean the request itself was unacceptable
const RPC_INVALID_ARGUMENT: i32 = 3;
const RPC_OUT_OF_RANGE: i32 = 11;

impl GeminiError {
    pub fn upload_failure_kind(&self) -> UploadFailureKind {
        match self {
            GeminiError::Timeout { .. } => UploadFailureKind::Timeout,
            GeminiError::Http(e) if e.is_timeout() => UploadFailureKind::Timeout,
            GeminiError::Api { status: 400 | 413, .. } => UploadFailureKind::Rejected,
            GeminiError::Operation { code, .. }
                if *code == RPC_INVALID_ARGUMENT || *code == RPC_OUT_OF_RANGE =>
            {
                UploadFailureKind::Rejected
            }
            _ => UploadFailureKind::Other,
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Turn a non-success response into `GeminiError::Api`, preferring the
/// `error.message` field of Google's JSON error envelope.
async fn api_error(resp: reqwest::Response) -> GeminiError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.error.message)
        .unwrap_or(text);
    GeminiError::Api { status, message }
}
