//! Message ledger
//!
//! Processing state of every candidate signup message, keyed by message id,
//! plus the todo queue of ids requested for out-of-band processing.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, MessageRecord, MessageStatus, RecordUpdate};

/// Todo entries returned per listing unless configured otherwise
pub const DEFAULT_TODO_LIMIT: usize = 50;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MessageLedger {
    records: BTreeMap<MessageId, MessageRecord>,
    /// Append-only until reconciled; may hold duplicates
    todo: Vec<MessageId>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_record(&self, message_id: MessageId) -> Option<&MessageRecord> {
        self.records.get(&message_id)
    }

    /// Set only the fields present in `update`; `last_modified` always moves.
    /// A record created by this call starts as `PROCESSING` unless a status
    /// is supplied.
    pub fn upsert_record(&mut self, message_id: MessageId, update: RecordUpdate, now: DateTime<Utc>) {
        let record = self.records.entry(message_id).or_insert_with(|| MessageRecord {
            message_id,
            status: MessageStatus::Processing,
            author_id: None,
            author_handle: None,
            text: None,
            reply: None,
            reason: None,
            last_modified: now,
        });

        if let Some(author_id) = update.author_id {
            record.author_id = Some(author_id);
        }
        if let Some(author_handle) = update.author_handle {
            record.author_handle = Some(author_handle);
        }
        if let Some(text) = update.text {
            record.text = Some(text);
        }
        if let Some(reply) = update.reply {
            record.reply = Some(reply);
        }
        if let Some(reason) = update.reason {
            record.reason = Some(reason);
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        record.last_modified = now;
    }

    pub fn status_counts(&self) -> BTreeMap<MessageStatus, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }

    /// Highest message id with a record, used as the feed cursor
    pub fn last_seen_id(&self) -> Option<MessageId> {
        self.records.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ============ Todo Queue ============

    pub fn enqueue(&mut self, message_id: MessageId) {
        self.todo.push(message_id);
    }

    /// Distinct queued ids in first-queued order, at most `limit`
    pub fn list(&self, limit: usize) -> Vec<MessageId> {
        let mut seen = HashSet::new();
        self.todo
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .take(limit)
            .collect()
    }

    pub fn is_queued(&self, message_id: MessageId) -> bool {
        self.todo.contains(&message_id)
    }

    /// Number of distinct queued ids
    pub fn queued_count(&self) -> usize {
        self.todo.iter().collect::<HashSet<_>>().len()
    }

    /// Drop every queue entry whose record is terminal; returns entries removed.
    /// Ids still `PROCESSING` stay queued for another attempt.
    pub fn reconcile(&mut self) -> usize {
        let before = self.todo.len();
        let records = &self.records;
        self.todo
            .retain(|id| !records.get(id).is_some_and(|r| r.status.is_terminal()));
        before - self.todo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(ledger: &mut MessageLedger, id: MessageId) {
        ledger.upsert_record(
            id,
            RecordUpdate::finished(MessageStatus::Passed, ""),
            Utc::now(),
        );
    }

    #[test]
    fn test_upsert_is_partial() {
        let mut ledger = MessageLedger::new();
        let t0 = Utc::now();
        ledger.upsert_record(7, RecordUpdate::processing(321, "author", "hello"), t0);

        let r = ledger.get_record(7).unwrap();
        assert_eq!(r.status, MessageStatus::Processing);
        assert_eq!(r.author_handle.as_deref(), Some("author"));
        assert_eq!(r.reply, None);

        let t1 = t0 + Duration::seconds(3);
        ledger.upsert_record(
            7,
            RecordUpdate::finished(MessageStatus::InvalidSignature, "@author bad sig"),
            t1,
        );

        let r = ledger.get_record(7).unwrap();
        assert_eq!(r.status, MessageStatus::InvalidSignature);
        assert_eq!(r.author_id, Some(321));
        assert_eq!(r.text.as_deref(), Some("hello"));
        assert_eq!(r.reply.as_deref(), Some("@author bad sig"));
        assert_eq!(r.last_modified, t1);
    }

    #[test]
    fn test_upsert_without_status_defaults_to_processing() {
        let mut ledger = MessageLedger::new();
        let update = RecordUpdate {
            text: Some("t".into()),
            ..RecordUpdate::default()
        };
        ledger.upsert_record(1, update, Utc::now());
        assert_eq!(ledger.get_record(1).unwrap().status, MessageStatus::Processing);
    }

    #[test]
    fn test_status_counts_and_last_seen() {
        let mut ledger = MessageLedger::new();
        assert_eq!(ledger.last_seen_id(), None);
        assert!(ledger.status_counts().is_empty());

        record(&mut ledger, 5);
        record(&mut ledger, 12);
        ledger.upsert_record(9, RecordUpdate::processing(1, "x", "y"), Utc::now());

        assert_eq!(ledger.last_seen_id(), Some(12));
        let counts = ledger.status_counts();
        assert_eq!(counts.get(&MessageStatus::Passed), Some(&2));
        assert_eq!(counts.get(&MessageStatus::Processing), Some(&1));
    }

    #[test]
    fn test_list_limit() {
        let mut ledger = MessageLedger::new();
        for id in 0..300 {
            ledger.enqueue(id);
        }
        assert_eq!(ledger.list(DEFAULT_TODO_LIMIT).len(), 50);
    }

    #[test]
    fn test_list_removes_duplicates() {
        let mut ledger = MessageLedger::new();
        for id in (1..10).chain(12..20).chain(5..15) {
            ledger.enqueue(id);
        }
        let mut ids = ledger.list(100);
        ids.sort_unstable();
        assert_eq!(ids, (1..20).collect::<Vec<_>>());
        assert_eq!(ledger.queued_count(), 19);
    }

    #[test]
    fn test_reconcile() {
        let cases: [(&[u64], &[u64], &[u64]); 5] = [
            (&[1, 2, 3], &[], &[1, 2, 3]),
            (&[1, 2, 3], &[2], &[1, 3]),
            (&[1, 2, 3], &[2, 3, 4, 5], &[1]),
            (&[], &[2, 3, 4, 5], &[]),
            (&[2, 3], &[2, 3, 4, 5], &[]),
        ];
        for (todo, processed, expected) in cases {
            let mut ledger = MessageLedger::new();
            for id in todo {
                ledger.enqueue(*id);
            }
            for id in processed {
                record(&mut ledger, *id);
            }
            ledger.reconcile();
            assert_eq!(ledger.list(100), expected.to_vec(), "todo={todo:?} processed={processed:?}");
        }
    }

    #[test]
    fn test_reconcile_keeps_processing_ids() {
        let mut ledger = MessageLedger::new();
        ledger.enqueue(5);
        ledger.enqueue(6);
        ledger.upsert_record(5, RecordUpdate::processing(1, "x", "y"), Utc::now());
        record(&mut ledger, 6);

        assert_eq!(ledger.reconcile(), 1);
        assert_eq!(ledger.list(100), vec![5]);

        ledger.upsert_record(
            5,
            RecordUpdate::finished(MessageStatus::InvalidFormat, ""),
            Utc::now(),
        );
        assert_eq!(ledger.reconcile(), 1);
        assert!(ledger.list(100).is_empty());
    }

    #[test]
    fn test_reconcile_counts_duplicates() {
        let mut ledger = MessageLedger::new();
        ledger.enqueue(4);
        ledger.enqueue(4);
        ledger.enqueue(8);
        record(&mut ledger, 4);
        assert_eq!(ledger.reconcile(), 2);
        assert!(ledger.is_queued(8));
        assert!(!ledger.is_queued(4));
    }
}
