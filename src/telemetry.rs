//! Tracing setup and per-operation timing events

use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `json` switches to one JSON object per line.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "smv_service=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Emits a single completion event for a named operation.
///
/// Create at the start of the operation inside its span; `finish` logs the
/// final status and the elapsed milliseconds.
pub struct OpTimer {
    action: &'static str,
    start: Instant,
}

impl OpTimer {
    pub fn start(action: &'static str) -> Self {
        Self {
            action,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn finish(self, status: &str) {
        tracing::info!(
            action = self.action,
            status,
            time_ms = self.elapsed_ms(),
            "operation finished"
        );
    }

    pub fn fail(self, error: &dyn std::fmt::Display) {
        tracing::warn!(
            action = self.action,
            status = "FAILED",
            error = %error,
            time_ms = self.elapsed_ms(),
            "operation failed"
        );
    }
}
