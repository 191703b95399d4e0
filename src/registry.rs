//! Identity registry
//!
//! Authoritative set of (public key, platform user id, handle) bindings.
//! A key or account may only ever be live under a single identity; claims
//! that would split one across two identities freeze all of them instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Identity, Party, PlatformUserId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("Blocked: {0}")]
    Blocked(String),
}

/// What a successful bind did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdentityRegistry {
    identities: Vec<Identity>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_identities(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    /// Bind `public_key` and `platform_user_id` under `handle`.
    ///
    /// Must run as one uninterrupted read-modify-write; callers hold the
    /// registry exclusively for the duration.
    pub fn bind(
        &mut self,
        public_key: &str,
        platform_user_id: PlatformUserId,
        handle: &str,
        now: DateTime<Utc>,
    ) -> Result<BindOutcome, BindError> {
        let claimed: Vec<usize> = self
            .identities
            .iter()
            .enumerate()
            .filter(|(_, i)| i.public_key == public_key || i.platform_user_id == platform_user_id)
            .map(|(idx, _)| idx)
            .collect();

        if claimed.len() > 1 {
            let reason = format!(
                "split claim: public key {} and user id {} belong to {} different identities",
                public_key,
                platform_user_id,
                claimed.len()
            );
            for idx in &claimed {
                let identity = &mut self.identities[*idx];
                if identity.blocked.is_none() {
                    identity.blocked = Some(reason.clone());
                }
                identity.last_modified = now;
            }
            return Err(BindError::Blocked(reason));
        }

        if let Some(idx) = claimed.first() {
            if let Some(reason) = &self.identities[*idx].blocked {
                return Err(BindError::Blocked(reason.clone()));
            }
        }

        let target = self.identities.iter().position(|i| {
            let key_match = i.public_key == public_key;
            let user_match = i.platform_user_id == platform_user_id;
            let handle_match = i.handle == handle;
            // A reused handle alone never links to an unrelated identity
            let stale_handle = handle_match && !key_match && !user_match;
            (key_match || user_match || handle_match) && !stale_handle
        });

        match target {
            Some(idx) => {
                let identity = &mut self.identities[idx];
                identity.public_key = public_key.to_string();
                identity.platform_user_id = platform_user_id;
                identity.handle = handle.to_string();
                identity.blocked = None;
                identity.last_modified = now;
                Ok(BindOutcome::Updated)
            }
            None => {
                self.identities.push(Identity {
                    public_key: public_key.to_string(),
                    platform_user_id,
                    handle: handle.to_string(),
                    blocked: None,
                    created: now,
                    last_modified: now,
                });
                Ok(BindOutcome::Inserted)
            }
        }
    }

    /// Non-blocked identities, in insertion order
    pub fn get_parties(&self) -> Vec<Party> {
        self.identities
            .iter()
            .filter(|i| !i.is_blocked())
            .map(Party::from)
            .collect()
    }

    /// Frozen identities, kept for audit
    pub fn get_blocked(&self) -> Vec<Identity> {
        self.identities
            .iter()
            .filter(|i| i.is_blocked())
            .cloned()
            .collect()
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
