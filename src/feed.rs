//! Social platform seam
//!
//! The pipeline only needs three things from the platform: search recent
//! messages newer than a cursor, look messages up by id, and reply.
//! `HttpFeed` speaks a small JSON protocol to a platform bridge.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{MessageId, PlatformUserId};

/// One message as delivered by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub message_id: MessageId,
    pub author_id: PlatformUserId,
    pub author_handle: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

pub type FeedResult<T> = Result<T, FeedError>;

#[async_trait]
pub trait MessageFeed: Send + Sync {
    /// Account the collector runs under; signups must mention it
    fn account_name(&self) -> &str;

    /// Messages matching `query` newer than `since_id`, newest first
    async fn search(&self, query: &str, since_id: Option<MessageId>) -> FeedResult<Vec<FeedMessage>>;

    /// Messages by id; unknown ids are silently absent
    async fn lookup(&self, ids: &[MessageId]) -> FeedResult<Vec<FeedMessage>>;

    async fn reply(&self, text: &str, in_reply_to: MessageId) -> FeedResult<()>;
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    messages: Vec<FeedMessage>,
    #[serde(default)]
    next_max_id: Option<MessageId>,
}

#[derive(Debug, Serialize)]
struct ReplyRequest<'a> {
    text: &'a str,
    in_reply_to: MessageId,
}

/// Cursor for the next search page; paging stops unless it moves strictly down
fn next_cursor(
    current: Option<MessageId>,
    next: Option<MessageId>,
    page_len: usize,
) -> Option<MessageId> {
    let next = next.filter(|_| page_len > 0)?;
    match current {
        Some(current) if next >= current => None,
        _ => Some(next),
    }
}

/// JSON-over-HTTP platform bridge client
pub struct HttpFeed {
    client: reqwest::Client,
    base_url: String,
    account_name: String,
    token: Option<String>,
}

impl HttpFeed {
    pub fn new(base_url: impl Into<String>, account_name: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_name: account_name.into(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(resp: reqwest::Response) -> FeedResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(FeedError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MessageFeed for HttpFeed {
    fn account_name(&self) -> &str {
        &self.account_name
    }

    async fn search(&self, query: &str, since_id: Option<MessageId>) -> FeedResult<Vec<FeedMessage>> {
        let mut messages = Vec::new();
        let mut max_id: Option<MessageId> = None;

        loop {
            let mut params: Vec<(&str, String)> = vec![("q", query.to_string())];
            if let Some(since) = since_id {
                params.push(("since_id", since.to_string()));
            }
            if let Some(max) = max_id {
                params.push(("max_id", max.to_string()));
            }

            let resp = self
                .request(reqwest::Method::GET, "/search")
                .query(&params)
                .send()
                .await?;
            let page: SearchPage = Self::check(resp).await?.json().await?;
            let page_len = page.messages.len();
            messages.extend(page.messages);

            match next_cursor(max_id, page.next_max_id, page_len) {
                Some(next) => max_id = Some(next),
                None => break,
            }
        }

        tracing::debug!("Feed search returned {} messages", messages.len());
        Ok(messages)
    }

    async fn lookup(&self, ids: &[MessageId]) -> FeedResult<Vec<FeedMessage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let resp = self
            .request(reqwest::Method::GET, "/messages")
            .query(&[("ids", joined)])
            .send()
            .await?;
        let page: SearchPage = Self::check(resp).await?.json().await?;
        Ok(page.messages)
    }

    async fn reply(&self, text: &str, in_reply_to: MessageId) -> FeedResult<()> {
        let resp = self
            .request(reqwest::Method::POST, "/replies")
            .json(&ReplyRequest { text, in_reply_to })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
