use super::{api_error, GeminiConfig, GeminiError, API_KEY_HEADER};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);
/// Uploads of large PDFs routinely outlive the default deadline.
pub const UPLOAD_MAX_WAIT: Duration = Duration::from_secs(600);

/// A long-running remote task as reported by the Operations API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub response: Option<serde_json::Value>,
    pub error: Option<OperationStatus>,
}

/// `google.rpc.Status` carried by an operation that finished unsuccessfully.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Wait until `op` reports `done`, re-fetching it through `refresh` every
/// `poll_interval`.
///
/// The whole wait runs under a single deadline: once `max_wait` has elapsed
/// the pending sleep or fetch is dropped and `GeminiError::Timeout` is
/// returned. Errors from `refresh` end the wait immediately.
pub async fn wait_operation<F, Fut>(
    op: Operation,
    poll_interval: Duration,
    max_wait: Duration,
    mut refresh: F,
) -> Result<Operation, GeminiError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Operation, GeminiError>>,
{
    let poll = async move {
        let mut op = op;
        let mut attempts = 0u32;
        while !op.done {
            tokio::time::sleep(poll_interval).await;
            attempts += 1;
            tracing::debug!(operation = %op.name, attempts, "polling operation");
            op = refresh(op.name.clone()).await?;
        }
        Ok::<_, GeminiError>(op)
    };

    match tokio::time::timeout(max_wait, poll).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(waited_secs = max_wait.as_secs(), "operation wait timed out");
            Err(GeminiError::Timeout { waited: max_wait })
        }
    }
}

/// Fetch the current state of an operation by resource name.
pub async fn get_operation(config: &GeminiConfig, name: String) -> Result<Operation, GeminiError> {
    let client = Client::new();
    let resp = client
        .get(config.api_url(&name))
        .header(API_KEY_HEADER, &config.api_key)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }

    Ok(resp.json().await?)
}
