use axum::extract::{Form, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use chrono::Local;
use serde::Deserialize;

use super::{finish, AppError, AppState};
use crate::session::export_file_name;

#[derive(Debug, Deserialize)]
pub struct QuestionForm {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionForm {
    pub index: usize,
}

pub async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, session) = state.open_session(jar);
    let mut session = session.lock().await;
    let page = state.pages.render(&mut session)?;
    Ok((jar, Html(page)))
}

pub async fn send_message(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<QuestionForm>,
) -> impl IntoResponse {
    let (jar, session) = state.open_session(jar);
    let mut session = session.lock().await;

    let result = match state.gemini_for(&session) {
        Ok(gemini) => session.ask(&gemini, &form.question).await,
        Err(e) => Err(e),
    };
    (jar, finish(&mut session, result))
}

pub async fn ask_suggested(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SuggestionForm>,
) -> impl IntoResponse {
    let (jar, session) = state.open_session(jar);
    let mut session = session.lock().await;

    let result = match state.gemini_for(&session) {
        Ok(gemini) => session.ask_suggested(&gemini, form.index).await,
        Err(e) => Err(e),
    };
    (jar, finish(&mut session, result))
}

pub async fn export_history(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, session) = state.open_session(jar);
    let session = session.lock().await;

    let body = session.export_transcript()?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(Local::now())
    );
    Ok((
        jar,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
