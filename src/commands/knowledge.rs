use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::CookieJar;

use super::{finish, AppError, AppState};
use crate::gemini::UploadFailureKind;
use crate::session::models::NoticeLevel;
use crate::session::upload_failure_message;

/// Pull the `file` field out of the upload form. `None` when the user
/// submitted without choosing a file.
async fn read_upload(
    multipart: &mut Multipart,
) -> Result<Option<(String, Vec<u8>)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        if file_name.is_empty() || bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some((file_name, bytes.to_vec())));
    }
    Ok(None)
}

pub async fn upload_document(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let (jar, session) = state.open_session(jar);
    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            let status = e.status();
            if status != StatusCode::PAYLOAD_TOO_LARGE && status != StatusCode::BAD_REQUEST {
                return (jar, Err(AppError::BadRequest(e.body_text())));
            }
            // Oversized or malformed bodies count as a rejected upload.
            tracing::warn!(%status, "upload body rejected: {}", e);
            let mut session = session.lock().await;
            session.notify(
                NoticeLevel::Error,
                upload_failure_message(UploadFailureKind::Rejected, &e),
            );
            return (jar, finish(&mut session, Ok(())));
        }
    };

    let mut session = session.lock().await;
    let result = match state.gemini_for(&session) {
        Ok(gemini) => match upload {
            Some((file_name, bytes)) => {
                tracing::info!(file = %file_name, size = bytes.len(), "processing upload");
                session.upload_pdf(&gemini, &file_name, bytes).await
            }
            None => {
                session.notify(NoticeLevel::Warning, "Choose a PDF file to upload.");
                Ok(())
            }
        },
        Err(e) => Err(e),
    };
    (jar, finish(&mut session, result))
}

pub async fn reset_document(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session) = state.open_session(jar);
    let mut session = session.lock().await;

    let gemini = state.gemini_for(&session).ok();
    if session.reset(gemini.as_ref()).await {
        session.notify(NoticeLevel::Info, "Document cleared. Upload a new PDF to start over.");
    }
    (jar, finish(&mut session, Ok(())))
}
