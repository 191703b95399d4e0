use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::DEFAULT_TODO_LIMIT;
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub persist_interval: Duration,
    /// Base URL of the platform bridge
    pub feed_url: String,
    pub feed_token: Option<String>,
    /// Collector account; signups must mention `@account_name`
    pub account_name: String,
    pub search_text: String,
    pub reply_delay: Duration,
    pub reply_invalid_signature: String,
    pub todo_limit: usize,
    pub log_json: bool,
    pub version: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            persist_interval: Duration::from_secs(
                env::var("PERSIST_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            feed_url: env::var("FEED_URL").unwrap_or_else(|_| "http://127.0.0.1:8090".into()),
            feed_token: env::var("FEED_TOKEN").ok().filter(|t| !t.is_empty()),
            account_name: env::var("ACCOUNT_NAME").unwrap_or_else(|_| "smv_collector".into()),
            search_text: env::var("SEARCH_TEXT").unwrap_or_default(),
            reply_delay: Duration::from_millis(
                env::var("REPLY_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
            reply_invalid_signature: env::var("REPLY_INVALID_SIGNATURE")
                .unwrap_or_else(|_| "Your message has an invalid signature.".into()),
            todo_limit: env::var("TODO_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_TODO_LIMIT),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            search_text: self.search_text.clone(),
            reply_delay: self.reply_delay,
            reply_invalid_signature: self.reply_invalid_signature.clone(),
            todo_limit: self.todo_limit,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
