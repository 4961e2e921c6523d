use axum::extract::{Form, State};
use axum::response::{IntoResponse, Redirect};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::AppState;
use crate::gemini::Model;
use crate::session::models::NoticeLevel;

#[derive(Debug, Deserialize)]
pub struct ApiKeyForm {
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelForm {
    pub model: String,
}

pub async fn set_api_key(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ApiKeyForm>,
) -> impl IntoResponse {
    let (jar, session) = state.open_session(jar);
    let mut session = session.lock().await;

    match session.set_api_key(&form.api_key) {
        Ok(()) => session.notify(NoticeLevel::Success, "API key saved for this session."),
        Err(e) => session.notify(NoticeLevel::Error, e.to_string()),
    }
    (jar, Redirect::to("/"))
}

pub async fn select_model(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ModelForm>,
) -> impl IntoResponse {
    let (jar, session) = state.open_session(jar);
    let mut session = session.lock().await;

    match form.model.parse::<Model>() {
        Ok(model) => session.select_model(model),
        Err(e) => session.notify(NoticeLevel::Error, e.to_string()),
    }
    (jar, Redirect::to("/"))
}
