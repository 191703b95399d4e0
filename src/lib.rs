//! SMV Service
//!
//! Social media verifier: binds ed25519 public keys to social platform
//! accounts by collecting signed signup messages from a public feed.
//!
//! ## Architecture
//!
//! - **Parser**: pulls the collector mention, hex public key and base64
//!   signature out of free-form message text
//! - **Crypto**: ed25519 over SHA3-256 of the author's handle, tolerant of
//!   common formatting variants
//! - **Registry**: key ↔ account bindings; conflicting claims freeze every
//!   identity involved
//! - **Ledger**: per-message processing records and a todo queue
//! - **Pipeline**: the state machine driving each message to a terminal status

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use pipeline::ProcessingPipeline;
pub use state::AppState;
pub use store::{SnapshotStore, Storage};
