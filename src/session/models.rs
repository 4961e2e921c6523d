use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::doc_processor::format_file_size;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub page_count: usize,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Local>,
}

impl DocumentMetadata {
    pub fn size_label(&self) -> String {
        format_file_size(self.size_bytes)
    }
}

/// The document currently loaded in a session together with the remote store
/// that indexes it. Both are created and dropped as one value.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoadedDocument {
    pub metadata: DocumentMetadata,
    pub store_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(skip)]
    pub sources: Option<serde_json::Value>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Option<serde_json::Value>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
        }
    }
}

/// Downloadable chat history.
#[derive(Debug, Serialize)]
pub struct ChatExport<'a> {
    pub exported_at: String,
    pub conversation: &'a [ChatTurn],
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A message for the user produced while handling an interaction.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}
