use super::operations::{self, get_operation};
use super::{api_error, GeminiConfig, GeminiError, API_KEY_HEADER};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Files above this size still upload, but the user is warned first.
pub const SIZE_WARNING_BYTES: u64 = 5 * 1024 * 1024;

const STORE_PREFIX: &str = "pdf-chat-store";
const UPLOAD_SOURCE: &str = "pdf_chat_upload";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchStore {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateStoreRequest<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadMetadata {
    display_name: String,
    custom_metadata: Vec<CustomMetadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomMetadata {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    numeric_value: Option<i64>,
}

/// A local file headed for a store.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub file_path: &'a Path,
    pub store_name: &'a str,
    pub display_name: &'a str,
}

/// Display name for a fresh store, e.g. `pdf-chat-store-3f9a0c1d`.
pub fn store_display_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", STORE_PREFIX, &id[..8])
}

pub async fn create_store(
    config: &GeminiConfig,
    display_name: &str,
) -> Result<FileSearchStore, GeminiError> {
    let client = Client::new();
    let resp = client
        .post(config.api_url("fileSearchStores"))
        .header(API_KEY_HEADER, &config.api_key)
        .json(&CreateStoreRequest { display_name })
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }

    let store: FileSearchStore = resp.json().await?;
    tracing::info!(store = %store.name, display_name, "created file search store");
    Ok(store)
}

/// Upload a file into a store and wait for indexing to finish.
///
/// Files larger than `config.size_warning_bytes` trigger `on_size_warning`
/// with the file size before anything is sent. Returns the finished
/// operation's `response` payload.
pub async fn upload_to_store(
    config: &GeminiConfig,
    request: UploadRequest<'_>,
    on_size_warning: impl FnOnce(u64) + Send,
) -> Result<Option<serde_json::Value>, GeminiError> {
    let bytes = tokio::fs::read(request.file_path).await?;
    let size = bytes.len() as u64;
    if size > config.size_warning_bytes {
        tracing::warn!(size, limit = config.size_warning_bytes, "large upload");
        on_size_warning(size);
    }

    let metadata = UploadMetadata {
        display_name: request.display_name.to_string(),
        custom_metadata: vec![
            CustomMetadata {
                key: "source".into(),
                string_value: Some(UPLOAD_SOURCE.into()),
                numeric_value: None,
            },
            CustomMetadata {
                key: "timestamp".into(),
                string_value: None,
                numeric_value: Some(chrono::Utc::now().timestamp()),
            },
        ],
    };

    let client = Client::new();

    // Resumable protocol: the start call hands back a session URL for the bytes.
    let resp = client
        .post(config.upload_url(&format!(
            "{}:uploadToFileSearchStore",
            request.store_name
        )))
        .header(API_KEY_HEADER, &config.api_key)
        .header("X-Goog-Upload-Protocol", "resumable")
        .header("X-Goog-Upload-Command", "start")
        .header("X-Goog-Upload-Header-Content-Length", size.to_string())
        .header("X-Goog-Upload-Header-Content-Type", "application/pdf")
        .json(&metadata)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }

    let upload_url = resp
        .headers()
        .get(UPLOAD_URL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(GeminiError::MissingUploadUrl)?;

    let resp = client
        .post(&upload_url)
        .header(API_KEY_HEADER, &config.api_key)
        .header("X-Goog-Upload-Command", "upload, finalize")
        .header("X-Goog-Upload-Offset", "0")
        .body(bytes)
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }

    let op: operations::Operation = resp.json().await?;
    tracing::debug!(operation = %op.name, store = request.store_name, "upload submitted");

    let op = operations::wait_operation(
        op,
        config.poll_interval,
        config.upload_timeout,
        |name| get_operation(config, name),
    )
    .await?;

    if let Some(status) = op.error {
        return Err(GeminiError::Operation {
            code: status.code,
            message: status.message,
        });
    }

    tracing::info!(store = request.store_name, size, "upload indexed");
    Ok(op.response)
}

/// Delete a store together with its documents.
pub async fn delete_store(config: &GeminiConfig, name: &str) -> Result<(), GeminiError> {
    let client = Client::new();
    let resp = client
        .delete(config.api_url(name))
        .header(API_KEY_HEADER, &config.api_key)
        .query(&[("force", "true")])
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(api_error(resp).await);
    }

    tracing::info!(store = name, "deleted file search store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::UploadFailureKind;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STORE: &str = "fileSearchStores/pdf-chat-store-abc";

    fn test_config(server: &MockServer) -> GeminiConfig {
        GeminiConfig {
            api_key: "test-key".into(),
            base_url: server.uri(),
            poll_interval: Duration::from_millis(10),
            upload_timeout: Duration::from_secs(5),
            size_warning_bytes: SIZE_WARNING_BYTES,
        }
    }

    fn temp_pdf(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(&vec![b'x'; len]).unwrap();
        file
    }

    async fn mount_upload_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("/upload/v1beta/{}:uploadToFileSearchStore", STORE)))
            .and(header("X-Goog-Upload-Command", "start"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(UPLOAD_URL_HEADER, format!("{}/resumable/session-1", server.uri())),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_store_display_name_shape() {
        let name = store_display_name();
        let suffix = name.strip_prefix("pdf-chat-store-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(name, store_display_name());
    }

    #[tokio::test]
    async fn test_create_store_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/fileSearchStores"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({"displayName": "pdf-chat-store-abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": STORE,
                "displayName": "pdf-chat-store-abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = create_store(&test_config(&server), "pdf-chat-store-abc")
            .await
            .unwrap();
        assert_eq!(store.name, STORE);
        assert_eq!(store.display_name.as_deref(), Some("pdf-chat-store-abc"));
    }

    #[tokio::test]
    async fn test_create_store_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/fileSearchStores"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let err = create_store(&test_config(&server), "x").await.unwrap_err();
        match err {
            GeminiError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_polls_operation_to_completion() {
        let server = MockServer::start().await;
        mount_upload_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/resumable/session-1"))
            .and(header("X-Goog-Upload-Offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": format!("{}/upload/operations/op-1", STORE),
                "done": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/v1beta/{}/upload/operations/op-1", STORE)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": format!("{}/upload/operations/op-1", STORE),
                "done": true,
                "response": {"documentName": format!("{}/documents/report-1", STORE)}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = temp_pdf(1024);
        let warned = AtomicU64::new(0);
        let response = upload_to_store(
            &test_config(&server),
            UploadRequest {
                file_path: file.path(),
                store_name: STORE,
                display_name: "report",
            },
            |size| warned.store(size, Ordering::SeqCst),
        )
        .await
        .unwrap();

        assert_eq!(warned.load(Ordering::SeqCst), 0);
        assert_eq!(
            response.unwrap()["documentName"],
            format!("{}/documents/report-1", STORE)
        );
    }

    #[tokio::test]
    async fn test_upload_warns_on_large_file_but_proceeds() {
        let server = MockServer::start().await;
        mount_upload_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/resumable/session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "op-2",
                "done": true,
                "response": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.size_warning_bytes = 512;
        let file = temp_pdf(2048);
        let warned = AtomicU64::new(0);

        let result = upload_to_store(
            &config,
            UploadRequest {
                file_path: file.path(),
                store_name: STORE,
                display_name: "big",
            },
            |size| warned.store(size, Ordering::SeqCst),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(warned.load(Ordering::SeqCst), 2048);
    }

    #[tokio::test]
    async fn test_upload_rejected_statuses() {
        for status in [400u16, 413] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path(format!("/upload/v1beta/{}:uploadToFileSearchStore", STORE)))
                .respond_with(ResponseTemplate::new(status).set_body_string("request rejected"))
                .mount(&server)
                .await;

            let file = temp_pdf(16);
            let err = upload_to_store(
                &test_config(&server),
                UploadRequest {
                    file_path: file.path(),
                    store_name: STORE,
                    display_name: "doc",
                },
                |_| {},
            )
            .await
            .unwrap_err();

            assert_eq!(err.upload_failure_kind(), UploadFailureKind::Rejected);
        }
    }

    #[tokio::test]
    async fn test_upload_missing_session_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/upload/v1beta/{}:uploadToFileSearchStore", STORE)))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let file = temp_pdf(16);
        let err = upload_to_store(
            &test_config(&server),
            UploadRequest {
                file_path: file.path(),
                store_name: STORE,
                display_name: "doc",
            },
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GeminiError::MissingUploadUrl));
        assert_eq!(err.upload_failure_kind(), UploadFailureKind::Other);
    }

    #[tokio::test]
    async fn test_upload_operation_error_is_surfaced() {
        let server = MockServer::start().await;
        mount_upload_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/resumable/session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "op-3",
                "done": true,
                "error": {"code": 3, "message": "Document could not be parsed"}
            })))
            .mount(&server)
            .await;

        let file = temp_pdf(16);
        let err = upload_to_store(
            &test_config(&server),
            UploadRequest {
                file_path: file.path(),
                store_name: STORE,
                display_name: "doc",
            },
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GeminiError::Operation { code: 3, .. }));
        assert_eq!(err.upload_failure_kind(), UploadFailureKind::Rejected);
    }

    #[tokio::test]
    async fn test_upload_times_out_when_operation_never_finishes() {
        let server = MockServer::start().await;
        mount_upload_session(&server).await;
        let pending = serde_json::json!({"name": "op-4", "done": false});
        Mock::given(method("POST"))
            .and(path("/resumable/session-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pending.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/op-4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pending))
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.upload_timeout = Duration::from_millis(100);
        let file = temp_pdf(16);

        let err = upload_to_store(
            &config,
            UploadRequest {
                file_path: file.path(),
                store_name: STORE,
                display_name: "doc",
            },
            |_| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.upload_failure_kind(), UploadFailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_delete_store_forces() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/v1beta/{}", STORE)))
            .and(query_param("force", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        delete_store(&test_config(&server), STORE).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_store_failure_reported() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = delete_store(&test_config(&server), STORE).await.unwrap_err();
        assert!(matches!(err, GeminiError::Api { status: 404, .. }));
    }
}
