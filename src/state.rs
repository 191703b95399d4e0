//! Application state for the SMV service

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::config::Config;
use crate::error::ApiResult;
use crate::feed::MessageFeed;
use crate::pipeline::{BatchSummary, ProcessingPipeline};
use crate::store::Storage;
use crate::types::*;

/// Shared state handed to every request handler
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub pipeline: ProcessingPipeline,
    pub config: Config,
    /// Start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, storage: Arc<dyn Storage>, feed: Arc<dyn MessageFeed>) -> Arc<Self> {
        let pipeline = ProcessingPipeline::new(Arc::clone(&storage), feed, config.pipeline());
        Arc::new(Self {
            storage,
            pipeline,
            config,
            start_time: Instant::now(),
        })
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".into(),
            version: self.config.version.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            parties_count: self.storage.get_parties().await.len(),
        }
    }

    pub async fn parties(&self) -> Vec<Party> {
        self.storage.get_parties().await
    }

    /// Frozen identities with their block reasons
    pub async fn blocked(&self) -> Vec<Identity> {
        self.storage.get_blocked().await
    }

    pub async fn statistics(&self) -> StatisticsResponse {
        StatisticsResponse {
            time: Utc::now(),
            status_counts: self.storage.status_counts().await,
            last_message_id: self.storage.last_seen_id().await,
            todo_count: self.storage.todo_count().await,
        }
    }

    pub async fn process_messages(&self) -> ApiResult<BatchSummary> {
        Ok(self.pipeline.process_new().await?)
    }

    pub async fn process_todo(&self) -> ApiResult<BatchSummary> {
        Ok(self.pipeline.process_todo().await?)
    }

    /// Report a message's terminal record, or queue it when it has none yet.
    /// A record stuck in `PROCESSING` is returned and queued for another attempt.
    pub async fn lookup_message(&self, message_id: MessageId) -> ApiResult<MessageLookupResponse> {
        let record = self.storage.get_record(message_id).await?;
        let status_description = record
            .as_ref()
            .map(|r| r.status.description().to_string());

        if let Some(record) = record.as_ref().filter(|r| r.status.is_terminal()) {
            return Ok(MessageLookupResponse {
                message_id,
                message: "Message was already processed".into(),
                status_description,
                record: Some(record.clone()),
            });
        }

        let message = if self.storage.is_todo(message_id).await {
            "Message is waiting to be processed"
        } else {
            self.storage.enqueue_todo(message_id).await?;
            tracing::info!(message_id, "Message added to the queue");
            "Message was added to the queue"
        };

        Ok(MessageLookupResponse {
            message_id,
            message: message.into(),
            record,
            status_description,
        })
    }

    pub async fn enqueue(&self, message_id: MessageId) -> ApiResult<TodoResponse> {
        self.storage.enqueue_todo(message_id).await?;
        Ok(TodoResponse {
            message_id,
            queued: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedMessage, FeedResult};
    use crate::store::SnapshotStore;
    use async_trait::async_trait;

    struct IdleFeed;

    #[async_trait]
    impl MessageFeed for IdleFeed {
        fn account_name(&self) -> &str {
            "collector"
        }

        async fn search(&self, _: &str, _: Option<MessageId>) -> FeedResult<Vec<FeedMessage>> {
            Ok(Vec::new())
        }

        async fn lookup(&self, _: &[MessageId]) -> FeedResult<Vec<FeedMessage>> {
            Ok(Vec::new())
        }

        async fn reply(&self, _: &str, _: MessageId) -> FeedResult<()> {
            Ok(())
        }
    }

    fn state() -> (Arc<AppState>, Arc<SnapshotStore>) {
        let store = SnapshotStore::in_memory();
        let state = AppState::new(Config::from_env(), store.clone(), Arc::new(IdleFeed));
        (state, store)
    }

    #[tokio::test]
    async fn test_lookup_queues_then_waits() {
        let (state, store) = state();

        let first = state.lookup_message(42).await.unwrap();
        assert_eq!(first.message, "Message was added to the queue");
        assert!(store.is_todo(42).await);

        let second = state.lookup_message(42).await.unwrap();
        assert_eq!(second.message, "Message is waiting to be processed");
        assert_eq!(store.list_todo(50).await, vec![42]);
    }

    #[tokio::test]
    async fn test_lookup_reports_existing_record() {
        let (state, store) = state();
        store
            .upsert_record(7, RecordUpdate::finished(MessageStatus::InvalidFormat, ""))
            .await
            .unwrap();

        let resp = state.lookup_message(7).await.unwrap();
        assert_eq!(resp.message, "Message was already processed");
        assert_eq!(
            resp.status_description.as_deref(),
            Some(MessageStatus::InvalidFormat.description())
        );
        assert!(!store.is_todo(7).await);
    }

    #[tokio::test]
    async fn test_lookup_queues_stuck_record() {
        let (state, store) = state();
        store
            .upsert_record(5, RecordUpdate::processing(321, "author", "text"))
            .await
            .unwrap();

        let resp = state.lookup_message(5).await.unwrap();
        assert_eq!(resp.message, "Message was added to the queue");
        assert_eq!(resp.record.unwrap().status, MessageStatus::Processing);
        assert!(store.is_todo(5).await);

        let resp = state.lookup_message(5).await.unwrap();
        assert_eq!(resp.message, "Message is waiting to be processed");
    }

    #[tokio::test]
    async fn test_statistics() {
        let (state, store) = state();
        store
            .upsert_record(3, RecordUpdate::finished(MessageStatus::Passed, ""))
            .await
            .unwrap();
        state.enqueue(9).await.unwrap();

        let stats = state.statistics().await;
        assert_eq!(stats.last_message_id, Some(3));
        assert_eq!(stats.todo_count, 1);
        assert_eq!(stats.status_counts.get(&MessageStatus::Passed), Some(&1));
    }
}
