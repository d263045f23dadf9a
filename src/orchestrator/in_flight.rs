//! Per-user single-flight guard.
//!
//! A user has at most one agent run in progress at a time. Suspended runs
//! parked in the approval gate do not count.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Set of users with a run in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    users: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `user_id` busy, or return `None` if a run is already active.
    #[must_use]
    pub fn try_acquire(&self, user_id: &str) -> Option<InFlightGuard> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.insert(user_id.to_owned()) {
            Some(InFlightGuard {
                users: Arc::clone(&self.users),
                user_id: user_id.to_owned(),
            })
        } else {
            None
        }
    }

    /// Whether `user_id` currently has a run in progress.
    #[must_use]
    pub fn is_busy(&self, user_id: &str) -> bool {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id)
    }
}

/// Releases the user's slot when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    users: Arc<Mutex<HashSet<String>>>,
    user_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}
