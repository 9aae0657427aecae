//! ManageSessionsUseCase: registry of in-flight onboarding sessions.
//!
//! The host keeps one [`SessionRegistry`] behind a mutex in its shared state.
//! Each session is wrapped in its own async mutex so that a slow validation in
//! one session never blocks lookups of another.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::application::onboard_device::OnboardingSession;

/// A session shared between the registry and whoever is driving it.
pub type SharedSession = Arc<Mutex<OnboardingSession>>;

/// In-memory map from session id to session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<Uuid, SharedSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `session` under a fresh id and returns the id.
    pub fn register(&mut self, session: OnboardingSession) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        debug!("registered onboarding session {id}");
        id
    }

    pub fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.get(&id).cloned()
    }

    /// Removes the session; dropping the last handle releases its secret.
    pub fn deregister(&mut self, id: Uuid) -> Option<SharedSession> {
        let removed = self.sessions.remove(&id);
        if removed.is_some() {
            debug!("deregistered onboarding session {id}");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session that reached a terminal state.
    ///
    /// Sessions currently locked by a caller are in use and are kept.
    /// Returns the number of sessions removed.
    pub fn prune_finished(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match session.try_lock() {
            Ok(guard) => !guard.is_finished(),
            Err(_) => true,
        });
        before - self.sessions.len()
    }
}
