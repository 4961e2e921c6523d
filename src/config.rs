use clap::Parser;
use std::time::Duration;

use crate::gemini::{self, GeminiConfig};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to serve the application on
    #[arg(long, env = "PDF_CHAT_ADDRESS", default_value = "127.0.0.1:8501")]
    pub address: String,

    /// Base URL of the Gemini REST API
    #[arg(long, env = "GEMINI_BASE_URL", default_value = gemini::DEFAULT_BASE_URL)]
    pub gemini_base_url: String,

    /// Seconds between polls of a pending upload operation
    #[arg(long, env = "PDF_CHAT_POLL_INTERVAL_SECS", default_value_t = 2)]
    pub poll_interval_secs: u64,

    /// Seconds to wait for an upload to be indexed before giving up
    #[arg(long, env = "PDF_CHAT_UPLOAD_TIMEOUT_SECS", default_value_t = 600)]
    pub upload_timeout_secs: u64,

    /// Uploads above this many bytes are flagged to the user
    #[arg(long, env = "PDF_CHAT_SIZE_WARNING_BYTES", default_value_t = gemini::file_search::SIZE_WARNING_BYTES)]
    pub size_warning_bytes: u64,

    /// Hard limit on request bodies, and therefore on uploaded files
    #[arg(long, env = "PDF_CHAT_MAX_UPLOAD_BYTES", default_value_t = 64 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Sessions idle this long are dropped and their stores deleted
    #[arg(long, env = "PDF_CHAT_SESSION_IDLE_SECS", default_value_t = 3600)]
    pub session_idle_secs: u64,

    /// Seconds between idle-session sweeps
    #[arg(long, env = "PDF_CHAT_SESSION_SWEEP_SECS", default_value_t = 60)]
    pub session_sweep_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["pdf-chat"])
    }
}

impl ServerConfig {
    /// Client settings for one session's credential.
    pub fn gemini_config(&self, api_key: &str) -> GeminiConfig {
        GeminiConfig {
            api_key: api_key.to_string(),
            base_url: self.gemini_base_url.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            upload_timeout: Duration::from_secs(self.upload_timeout_secs),
            size_warning_bytes: self.size_warning_bytes,
        }
    }
}
