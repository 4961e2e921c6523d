pub mod models;

use chrono::{DateTime, Local};
use models::{ChatExport, ChatTurn, DocumentMetadata, LoadedDocument, Notice, NoticeLevel, Role};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::doc_processor;
use crate::gemini::file_search::{self, UploadRequest};
use crate::gemini::generate;
use crate::gemini::{GeminiConfig, Model, UploadFailureKind};

/// Assistant turn recorded when no answer could be produced.
pub const FALLBACK_ANSWER: &str =
    "I couldn't generate a response. Please try rephrasing your question.";

pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "What are the main topics covered in this document?",
    "Can you provide a summary of the key points?",
    "What are the most important findings or conclusions?",
    "Are there any specific recommendations or action items mentioned?",
];

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("API key is required.")]
    MissingCredential,
    #[error("API key error: {0}")]
    InvalidCredential(String),
    #[error("Upload a PDF before asking questions.")]
    NoDocument,
    #[error("A document is already loaded. Clear it before uploading another one.")]
    DocumentLoaded,
    #[error("Unknown suggested question: {0}")]
    UnknownSuggestion(usize),
}

/// Everything one browser session knows. Each interaction gets `&mut` access
/// for the duration of a single pass.
#[derive(Debug, Default)]
pub struct ChatSession {
    api_key: Option<String>,
    model: Model,
    document: Option<LoadedDocument>,
    transcript: Vec<ChatTurn>,
    pending_question: Option<String>,
    notices: Vec<Notice>,
}

impl ChatSession {
    // ── Credential & model ──

    pub fn set_api_key(&mut self, api_key: &str) -> Result<(), SessionError> {
        let key = api_key.trim();
        if key.is_empty() {
            self.api_key = None;
            return Err(SessionError::MissingCredential);
        }
        reqwest::header::HeaderValue::from_str(key)
            .map_err(|e| SessionError::InvalidCredential(e.to_string()))?;
        self.api_key = Some(key.to_string());
        Ok(())
    }

    pub fn credential(&self) -> Result<&str, SessionError> {
        self.api_key
            .as_deref()
            .ok_or(SessionError::MissingCredential)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn select_model(&mut self, model: Model) {
        tracing::debug!(model = model.id(), "model selected");
        self.model = model;
    }

    // ── Read access ──

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn question_count(&self) -> usize {
        self.transcript
            .iter()
            .filter(|t| t.role == Role::User)
            .count()
    }

    pub fn exchange_count(&self) -> usize {
        self.transcript.len() / 2
    }

    pub fn suggested_questions(&self) -> &'static [&'static str] {
        &SUGGESTED_QUESTIONS
    }

    // ── Notices ──

    pub fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            NoticeLevel::Error => tracing::error!("{}", text),
            NoticeLevel::Warning => tracing::warn!("{}", text),
            _ => tracing::info!("{}", text),
        }
        self.notices.push(Notice { level, text });
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ── Document lifecycle ──

    /// Index an uploaded PDF in a fresh store.
    ///
    /// Remote and parsing failures end up as notices; the session only gains
    /// a document once both store creation and upload have succeeded.
    pub async fn upload_pdf(
        &mut self,
        gemini: &GeminiConfig,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), SessionError> {
        if self.document.is_some() {
            return Err(SessionError::DocumentLoaded);
        }
        if let Err(e) = doc_processor::ensure_pdf(file_name) {
            self.notify(NoticeLevel::Error, e.to_string());
            return Ok(());
        }

        let temp = match doc_processor::save_temp_pdf(&bytes) {
            Ok(file) => file,
            Err(e) => {
                self.notify(NoticeLevel::Error, format!("Error saving file: {}", e));
                return Ok(());
            }
        };

        let size_bytes = bytes.len() as u64;
        let uploaded_at = Local::now();
        let page_count = match doc_processor::extract_pdf_blocking(bytes).await {
            Ok(extraction) => extraction.page_count,
            Err(e) => {
                self.notify(
                    NoticeLevel::Error,
                    format!("Error extracting text from PDF: {}", e),
                );
                0
            }
        };

        let store = match file_search::create_store(gemini, &file_search::store_display_name())
            .await
        {
            Ok(store) => store,
            Err(e) => {
                self.notify(
                    NoticeLevel::Error,
                    format!("Error creating file search store: {}", e),
                );
                return Ok(());
            }
        };

        let display_name = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        let result = file_search::upload_to_store(
            gemini,
            UploadRequest {
                file_path: temp.path(),
                store_name: &store.name,
                display_name,
            },
            |size| {
                self.notify(
                    NoticeLevel::Warning,
                    format!(
                        "Large file detected ({}). This may take longer to process or fail. Consider using a smaller file.",
                        doc_processor::format_file_size(size)
                    ),
                )
            },
        )
        .await;

        let _ = temp.close();

        match result {
            Ok(_) => {
                self.document = Some(LoadedDocument {
                    metadata: DocumentMetadata {
                        file_name: file_name.to_string(),
                        page_count,
                        size_bytes,
                        uploaded_at,
                    },
                    store_name: store.name,
                });
                self.notify(
                    NoticeLevel::Success,
                    format!("Successfully uploaded: {}", file_name),
                );
            }
            Err(e) => {
                self.notify(
                    NoticeLevel::Error,
                    upload_failure_message(e.upload_failure_kind(), &e),
                );

                // The store never became the session's, so nothing else will delete it.
                if let Err(e) = file_search::delete_store(gemini, &store.name).await {
                    tracing::warn!(store = %store.name, "failed to delete orphaned store: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Drop the document, its store and the conversation. Returns whether a
    /// document was loaded.
    ///
    /// Local state is cleared even when the remote delete fails or no
    /// credential is available to attempt it.
    pub async fn reset(&mut self, gemini: Option<&GeminiConfig>) -> bool {
        let had_document = self.document.is_some();
        if let Some(document) = self.document.take() {
            match gemini {
                Some(gemini) => {
                    if let Err(e) = file_search::delete_store(gemini, &document.store_name).await
                    {
                        self.notify(
                            NoticeLevel::Error,
                            format!("Error cleaning up store: {}", e),
                        );
                    }
                }
                None => tracing::warn!(
                    store = %document.store_name,
                    "no credential to delete store, dropping handle"
                ),
            }
        }
        self.transcript.clear();
        self.pending_question = None;
        had_document
    }

    // ── Conversation ──

    /// Ask a question about the loaded document and record both turns.
    pub async fn ask(&mut self, gemini: &GeminiConfig, question: &str) -> Result<(), SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(());
        }
        let store_name = self
            .document
            .as_ref()
            .map(|d| d.store_name.clone())
            .ok_or(SessionError::NoDocument)?;

        self.transcript.push(ChatTurn::user(question));

        match generate::generate(gemini, self.model, question, &store_name).await {
            Ok(answer) => {
                self.transcript
                    .push(ChatTurn::assistant(answer.text, answer.grounding_metadata));
            }
            Err(e) => {
                self.notify(
                    NoticeLevel::Error,
                    format!("Error querying file search: {}", e),
                );
                self.transcript.push(ChatTurn::assistant(FALLBACK_ANSWER, None));
            }
        }
        Ok(())
    }

    /// Queue one of the suggested questions and answer it in the same pass.
    pub async fn ask_suggested(
        &mut self,
        gemini: &GeminiConfig,
        index: usize,
    ) -> Result<(), SessionError> {
        let question = SUGGESTED_QUESTIONS
            .get(index)
            .ok_or(SessionError::UnknownSuggestion(index))?;
        self.pending_question = Some(question.to_string());
        self.process_pending(gemini).await
    }

    async fn process_pending(&mut self, gemini: &GeminiConfig) -> Result<(), SessionError> {
        match self.pending_question.take() {
            Some(question) => self.ask(gemini, &question).await,
            None => Ok(()),
        }
    }

    // ── Export ──

    pub fn export_transcript(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&ChatExport {
            exported_at: Local::now().to_rfc3339(),
            conversation: &self.transcript,
        })
    }
}

/// User-facing text for a failed upload.
pub fn upload_failure_message(
    kind: UploadFailureKind,
    error: &dyn std::fmt::Display,
) -> String {
    match kind {
        UploadFailureKind::Timeout => {
            "Upload timed out. The file may be too large. Try a smaller PDF (under 2-3 MB recommended)."
                .to_string()
        }
        UploadFailureKind::Rejected => format!(
            "The file was rejected as malformed or too large. Try a smaller PDF (under 2 MB recommended). Error: {}",
            error
        ),
        UploadFailureKind::Other => format!("Error uploading file to store: {}", error),
    }
}

pub fn export_file_name(now: DateTime<Local>) -> String {
    format!("chat_history_{}.json", now.format("%Y%m%d_%H%M%S"))
}

pub type SharedSession = Arc<Mutex<ChatSession>>;

struct SessionEntry {
    session: SharedSession,
    last_seen: parking_lot::Mutex<Instant>,
}

impl SessionEntry {
    fn touch(&self) -> SharedSession {
        *self.last_seen.lock() = Instant::now();
        self.session.clone()
    }
}

/// All live sessions, keyed by the id stored in the session cookie.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session and mark it as active.
    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.read().get(id).map(SessionEntry::touch)
    }

    /// Look up the session for `id`, or start a new one under a fresh id when
    /// `id` is missing or unknown.
    pub fn get_or_create(&self, id: Option<&str>) -> (String, SharedSession) {
        if let Some(id) = id {
            if let Some(session) = self.get(id) {
                return (id.to_string(), session);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session: SharedSession = Arc::new(Mutex::new(ChatSession::default()));
        self.sessions.write().insert(
            id.clone(),
            SessionEntry {
                session: session.clone(),
                last_seen: parking_lot::Mutex::new(Instant::now()),
            },
        );
        tracing::debug!(session = %id, "created session");
        (id, session)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Remove every session idle for at least `ttl`, deleting its store
    /// best-effort. `gemini_for` builds client settings from a credential.
    pub async fn sweep_idle<F>(&self, ttl: Duration, gemini_for: F) -> usize
    where
        F: Fn(&str) -> GeminiConfig,
    {
        let expired: Vec<(String, SharedSession)> = {
            let mut sessions = self.sessions.write();
            let now = Instant::now();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(*entry.last_seen.lock()) >= ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry.session)))
                .collect()
        };

        for (id, session) in &expired {
            let mut session = session.lock().await;
            let gemini = session.credential().ok().map(&gemini_for);
            session.reset(gemini.as_ref()).await;
            session.api_key = None;
            tracing::info!(session = %id, "expired idle session");
        }
        expired.len()
    }
}

/// Sweep idle sessions every `every` until the runtime shuts down.
pub fn spawn_idle_sweep<F>(
    store: SessionStore,
    ttl: Duration,
    every: Duration,
    gemini_for: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(&str) -> GeminiConfig + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.sweep_idle(ttl, &gemini_for).await;
            if removed > 0 {
                tracing::debug!(removed, remaining = store.len(), "idle sweep");
            }
        }
    })
}
