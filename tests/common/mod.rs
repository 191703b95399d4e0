use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use reqwest::Client;
use tempfile::TempDir;
use tokio::net::TcpListener;

use smv_service::crypto::message_digest;
use smv_service::feed::{FeedMessage, FeedResult, MessageFeed};
use smv_service::types::MessageId;
use smv_service::SnapshotStore;

pub const ACCOUNT: &str = "smv_collector";
pub const SEARCH_TEXT: &str = "Verifying my key with";
pub const INVALID_SIGNATURE_REPLY: &str = "Message has invalid signature.";

/// Test client for API calls
pub struct TestClient {
    pub base_url: String,
    pub client: Client,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: Client::new(),
        }
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn post(&self, path: &str) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn get_json(&self, path: &str) -> (u16, serde_json::Value) {
        let resp = self.get(path).await;
        let status = resp.status().as_u16();
        (status, resp.json().await.expect("Invalid JSON body"))
    }
}

/// In-process platform with a fixed message timeline
#[derive(Default)]
pub struct ScriptedFeed {
    messages: Mutex<Vec<FeedMessage>>,
    replies: Mutex<Vec<(String, MessageId)>>,
}

impl ScriptedFeed {
    pub fn post(&self, msg: FeedMessage) {
        self.messages.lock().unwrap().push(msg);
    }

    pub fn replies(&self) -> Vec<(String, MessageId)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageFeed for ScriptedFeed {
    fn account_name(&self) -> &str {
        ACCOUNT
    }

    async fn search(&self, query: &str, since_id: Option<MessageId>) -> FeedResult<Vec<FeedMessage>> {
        let mut found: Vec<FeedMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.text.starts_with(query))
            .filter(|m| since_id.map_or(true, |s| m.message_id > s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.message_id.cmp(&a.message_id));
        Ok(found)
    }

    async fn lookup(&self, ids: &[MessageId]) -> FeedResult<Vec<FeedMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| ids.contains(&m.message_id))
            .cloned()
            .collect())
    }

    async fn reply(&self, text: &str, in_reply_to: MessageId) -> FeedResult<()> {
        self.replies
            .lock()
            .unwrap()
            .push((text.to_string(), in_reply_to));
        Ok(())
    }
}

/// A user holding an ed25519 key
pub struct KeyHolder {
    key: SigningKey,
}

impl KeyHolder {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    pub fn sign_handle(&self, handle: &str) -> String {
        BASE64.encode(self.key.sign(&message_digest(handle)).to_bytes())
    }

    /// A signup message as the service expects it
    pub fn signup(&self, message_id: MessageId, author_id: u64, handle: &str) -> FeedMessage {
        self.signup_signed_for(message_id, author_id, handle, handle)
    }

    pub fn signup_signed_for(
        &self,
        message_id: MessageId,
        author_id: u64,
        handle: &str,
        signed_handle: &str,
    ) -> FeedMessage {
        FeedMessage {
            message_id,
            author_id,
            author_handle: handle.to_string(),
            text: format!(
                "{SEARCH_TEXT} @{ACCOUNT} {}\n{}",
                self.public_key(),
                self.sign_handle(&format!("@{signed_handle}"))
            ),
        }
    }
}

pub struct TestServer {
    pub client: TestClient,
    pub feed: Arc<ScriptedFeed>,
    pub store: Arc<SnapshotStore>,
    pub data_dir: TempDir,
}

/// Start a test server over a scripted feed
pub async fn start_test_server() -> TestServer {
    use smv_service::api::create_router;
    use smv_service::config::Config;
    use smv_service::state::AppState;

    let data_dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config {
        host: "127.0.0.1".into(),
        port: 0,
        data_dir: data_dir.path().to_path_buf(),
        account_name: ACCOUNT.into(),
        search_text: SEARCH_TEXT.into(),
        reply_delay: Duration::ZERO,
        reply_invalid_signature: INVALID_SIGNATURE_REPLY.into(),
        ..Config::default()
    };

    let store = SnapshotStore::new(config.state_file_path());
    let feed = Arc::new(ScriptedFeed::default());
    let state = AppState::new(config, store.clone(), feed.clone());
    let app = create_router(state);

    // Bind to random port
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    // Wait for server to be ready
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        client: TestClient::new(format!("http://{}", addr)),
        feed,
        store,
        data_dir,
    }
}
