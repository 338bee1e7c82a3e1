use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::models::session::Session;

/// Holder of the current session.
///
/// Clones share the same slot. The store is the only owner of the session;
/// callers get copies scoped to a single operation.
#[derive(Clone, Default)]
pub struct CredentialStore {
    slot: Arc<RwLock<Option<Session>>>,
    rotations: Arc<AtomicU64>,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(session))),
            rotations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The cached session, without any network call.
    pub async fn current(&self) -> Option<Session> {
        self.slot.read().await.clone()
    }

    /// Replaces the stored session with a rotated one.
    pub async fn replace(&self, session: Session) {
        let mut slot = self.slot.write().await;
        *slot = Some(session);
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops the stored session (sign-out).
    pub async fn clear(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }

    /// How many times the session was replaced since creation.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }
}
