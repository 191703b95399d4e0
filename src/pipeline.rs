//! Signup processing pipeline
//!
//! Runs every candidate message through parse → verify → bind and records
//! the outcome in the ledger. Messages are applied strictly one at a time,
//! oldest first, since each bind may depend on the previous one.
//!
//! ```text
//! UNSEEN ──► PROCESSING ──► PASSED
//!                      ├──► INVALID_FORMAT
//!                      ├──► INVALID_SIGNATURE (reply sent)
//!                      └──► BLOCKLISTED
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::crypto;
use crate::error::StoreError;
use crate::feed::{FeedError, FeedMessage, MessageFeed};
use crate::parser;
use crate::registry::BindError;
use crate::store::Storage;
use crate::telemetry::OpTimer;
use crate::types::{MessageStatus, RecordUpdate};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to fetch messages: {0}")]
    Feed(FeedError),
    #[error("Failed to send reply: {0}")]
    Reply(FeedError),
    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("A processing pass is already running")]
    Busy,
}

/// Result of handling one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Already terminal in the ledger; nothing written
    Skipped,
    Recorded(MessageStatus),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Skipped => "SKIP",
            Outcome::Recorded(MessageStatus::Passed) => "SUCCESS",
            Outcome::Recorded(_) => "FAILED",
        }
    }
}

/// Totals for one processing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub fetched: usize,
    pub processed: usize,
    pub skipped: usize,
    /// Messages whose handling failed part way and stay `PROCESSING`
    pub failed: usize,
    pub statuses: BTreeMap<MessageStatus, usize>,
}

impl BatchSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::Recorded(status) => {
                self.processed += 1;
                *self.statuses.entry(status).or_insert(0) += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Text every signup message starts with; the account mention is appended
    pub search_text: String,
    /// Courtesy pause before replying to the platform
    pub reply_delay: Duration,
    pub reply_invalid_signature: String,
    pub todo_limit: usize,
}

pub struct ProcessingPipeline {
    storage: Arc<dyn Storage>,
    feed: Arc<dyn MessageFeed>,
    config: PipelineConfig,
    /// Held for the whole of a pass; one pass at a time
    run_lock: Mutex<()>,
}

impl ProcessingPipeline {
    pub fn new(storage: Arc<dyn Storage>, feed: Arc<dyn MessageFeed>, config: PipelineConfig) -> Self {
        Self {
            storage,
            feed,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// The collector account mention every signup must carry
    pub fn expected_handle(&self) -> String {
        format!("@{}", self.feed.account_name())
    }

    pub fn search_query(&self) -> String {
        format!("{} {}", self.config.search_text, self.expected_handle())
            .trim()
            .to_string()
    }

    /// Handle a single message through the state machine
    pub async fn process_message(&self, msg: &FeedMessage) -> Result<Outcome, PipelineError> {
        let span = tracing::info_span!(
            "process_message",
            message_id = msg.message_id,
            author_id = msg.author_id,
            author_handle = %msg.author_handle,
        );
        async move {
            let timer = OpTimer::start("process_message");
            match self.apply(msg).await {
                Ok(outcome) => {
                    timer.finish(outcome.label());
                    Ok(outcome)
                }
                Err(e) => {
                    timer.fail(&e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, msg: &FeedMessage) -> Result<Outcome, PipelineError> {
        if let Some(existing) = self.storage.get_record(msg.message_id).await? {
            if existing.status.is_terminal() {
                return Ok(Outcome::Skipped);
            }
            tracing::info!("Resuming message left in PROCESSING");
        }

        self.storage
            .upsert_record(
                msg.message_id,
                RecordUpdate::processing(msg.author_id, &msg.author_handle, &msg.text),
            )
            .await?;

        let parsed = match parser::parse(&msg.text, &self.expected_handle()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::info!(error = %e, "Invalid Format");
                return self.finish(msg, MessageStatus::InvalidFormat, "").await;
            }
        };
        tracing::info!(
            pubkey = %parsed.public_key,
            signed_message = %parsed.signature,
            "Parsed signup"
        );

        if !crypto::verify(&parsed.public_key, &parsed.signature, &msg.author_handle) {
            tracing::info!("Invalid Signature");
            tokio::time::sleep(self.config.reply_delay).await;
            let reply = format!("@{} {}", msg.author_handle, self.config.reply_invalid_signature);
            self.feed
                .reply(&reply, msg.message_id)
                .await
                .map_err(PipelineError::Reply)?;
            return self.finish(msg, MessageStatus::InvalidSignature, reply).await;
        }

        match self
            .storage
            .bind(&parsed.public_key, msg.author_id, &msg.author_handle)
            .await
        {
            Ok(outcome) => {
                tracing::info!(?outcome, "Identity bound");
                self.finish(msg, MessageStatus::Passed, "").await
            }
            Err(BindError::Blocked(reason)) => {
                tracing::warn!(%reason, "Signup blocklisted");
                self.storage
                    .upsert_record(
                        msg.message_id,
                        RecordUpdate::finished(MessageStatus::Blocklisted, "").with_reason(reason),
                    )
                    .await?;
                Ok(Outcome::Recorded(MessageStatus::Blocklisted))
            }
        }
    }

    async fn finish(
        &self,
        msg: &FeedMessage,
        status: MessageStatus,
        reply: impl Into<String>,
    ) -> Result<Outcome, PipelineError> {
        self.storage
            .upsert_record(msg.message_id, RecordUpdate::finished(status, reply))
            .await?;
        Ok(Outcome::Recorded(status))
    }

    /// Apply messages oldest first. Reply failures are counted and skipped;
    /// storage failures end the batch.
    async fn run_batch(&self, mut messages: Vec<FeedMessage>) -> Result<BatchSummary, PipelineError> {
        messages.sort_by_key(|m| m.message_id);

        let mut summary = BatchSummary {
            fetched: messages.len(),
            ..BatchSummary::default()
        };
        for msg in &messages {
            match self.process_message(msg).await {
                Ok(outcome) => summary.record(outcome),
                Err(PipelineError::Reply(e)) => {
                    tracing::error!(message_id = msg.message_id, "Reply not sent: {}", e);
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if summary.processed + summary.failed > 0 {
            self.storage.request_persist();
        }
        Ok(summary)
    }

    /// Fetch everything newer than the ledger cursor and process it
    pub async fn process_new(&self) -> Result<BatchSummary, PipelineError> {
        let _guard = self.run_lock.try_lock().map_err(|_| PipelineError::Busy)?;
        let timer = OpTimer::start("process_new");

        let query = self.search_query();
        let since_id = self.storage.last_seen_id().await;
        tracing::info!(%query, ?since_id, "Searching feed");

        let messages = match self.feed.search(&query, since_id).await {
            Ok(messages) => messages,
            Err(e) => {
                timer.fail(&e);
                return Err(PipelineError::Feed(e));
            }
        };
        tracing::info!(total_count = messages.len(), "Fetched messages");

        // the feed returns newest first
        let messages: Vec<FeedMessage> = messages.into_iter().rev().collect();
        match self.run_batch(messages).await {
            Ok(summary) => {
                tracing::info!(
                    processed = summary.processed,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Batch complete"
                );
                timer.finish("SUCCESS");
                Ok(summary)
            }
            Err(e) => {
                timer.fail(&e);
                Err(e)
            }
        }
    }

    /// Process ids queued in the todo list
    pub async fn process_todo(&self) -> Result<BatchSummary, PipelineError> {
        let _guard = self.run_lock.try_lock().map_err(|_| PipelineError::Busy)?;
        let timer = OpTimer::start("process_todo");

        let result: Result<BatchSummary, PipelineError> = async {
            self.storage.reconcile_todo().await?;
            let ids = self.storage.list_todo(self.config.todo_limit).await;
            if ids.is_empty() {
                return Ok(BatchSummary::default());
            }
            tracing::info!(todo_count = ids.len(), "Looking up queued messages");

            let messages = self.feed.lookup(&ids).await.map_err(PipelineError::Feed)?;
            let summary = self.run_batch(messages).await?;
            self.storage.reconcile_todo().await?;
            Ok(summary)
        }
        .await;

        match &result {
            Ok(_) => timer.finish("SUCCESS"),
            Err(e) => timer.fail(e),
        }
        result
    }
}
