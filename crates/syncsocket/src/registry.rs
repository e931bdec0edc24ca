//! Session registry: session id → live session.
//!
//! The registry is what lets a new physical connection find the logical
//! session it belongs to. It is an explicitly owned object (one per server
//! or client), so independent servers in one process never share sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use syncsocket_core::SessionId;

use crate::session::Session;

type Sessions = HashMap<SessionId, Session>;

/// Shared map of live sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<Sessions>>,
}

/// Non-owning handle held by sessions so termination can deregister them.
#[derive(Clone, Default)]
pub(crate) struct WeakRegistry {
    sessions: Weak<Mutex<Sessions>>,
}

fn lock(sessions: &Mutex<Sessions>) -> MutexGuard<'_, Sessions> {
    sessions.lock().unwrap_or_else(|e| e.into_inner())
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session by id.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        lock(&self.sessions).get(id).cloned()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        lock(&self.sessions).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.sessions).is_empty()
    }

    /// Ids of all registered sessions.
    pub fn ids(&self) -> Vec<SessionId> {
        lock(&self.sessions).keys().cloned().collect()
    }

    /// Register `session` unless its id is taken.
    ///
    /// On conflict the already registered session is returned.
    pub(crate) fn insert_new(&self, session: Session) -> Result<(), Session> {
        let mut sessions = lock(&self.sessions);
        match sessions.get(session.id()) {
            Some(existing) => Err(existing.clone()),
            None => {
                sessions.insert(session.id().clone(), session);
                Ok(())
            }
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            sessions: Arc::downgrade(&self.sessions),
        }
    }
}

impl WeakRegistry {
    /// Remove `session` if it is the one registered under its id.
    ///
    /// Returns true if an entry was removed.
    pub(crate) fn remove(&self, session: &Session) -> bool {
        let Some(sessions) = self.sessions.upgrade() else {
            return false;
        };
        let mut sessions = lock(&sessions);
        match sessions.get(session.id()) {
            Some(registered) if registered == session => {
                sessions.remove(session.id());
                true
            }
            _ => false,
        }
    }
}
