pub mod chat;
pub mod knowledge;
pub mod settings;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::gemini::GeminiConfig;
use crate::session::models::NoticeLevel;
use crate::session::{ChatSession, SessionError, SessionStore, SharedSession};
use crate::ui::Pages;

pub const SESSION_COOKIE: &str = "pdfchat_session";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: SessionStore,
    pub pages: Arc<Pages>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, minijinja::Error> {
        Ok(Self {
            config: Arc::new(config),
            sessions: SessionStore::new(),
            pages: Arc::new(Pages::new()?),
        })
    }

    /// Resolve the caller's session, issuing a cookie when it is new.
    pub fn open_session(&self, jar: CookieJar) -> (CookieJar, SharedSession) {
        let existing = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
        let (id, session) = self.sessions.get_or_create(existing.as_deref());
        if existing.as_deref() == Some(id.as_str()) {
            return (jar, session);
        }

        let cookie = Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        (jar.add(cookie), session)
    }

    pub fn gemini_for(&self, session: &ChatSession) -> Result<GeminiConfig, SessionError> {
        Ok(self.config.gemini_config(session.credential()?))
    }
}

#[derive(Serialize)]
struct JsonError {
    message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Export failed: {0}")]
    Export(#[from] serde_json::Error),
    #[error("Render failed: {0}")]
    Render(#[from] minijinja::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Session(SessionError::MissingCredential)
            | AppError::Session(SessionError::InvalidCredential(_)) => StatusCode::UNAUTHORIZED,
            AppError::Session(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Export(_) | AppError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::debug!(%status, "request failed: {}", self);
        let mut resp = Json(JsonError {
            message: self.to_string(),
        })
        .into_response();
        *resp.status_mut() = status;
        resp
    }
}

/// Close out an interaction: back to the page, with any recoverable error
/// shown as a notice. A missing credential stops the interaction instead.
fn finish(session: &mut ChatSession, result: Result<(), SessionError>) -> Result<Redirect, AppError> {
    match result {
        Ok(()) => Ok(Redirect::to("/")),
        Err(SessionError::MissingCredential) => Err(SessionError::MissingCredential.into()),
        Err(e) => {
            session.notify(NoticeLevel::Error, e.to_string());
            Ok(Redirect::to("/"))
        }
    }
}
