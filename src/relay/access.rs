//! Access policies and the live session registry.
//!
//! With no policies configured every connection is admitted. Otherwise a
//! connection must present the password of one policy, and is refused when
//! that policy's session cap is already reached. Admitted connections hold a
//! [`SessionTicket`]; dropping it removes the session from the registry.

use log::{debug, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Identifier assigned to each admitted connection.
pub type SessionId = u64;

/// A named password with an optional cap on concurrent sessions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessPolicy {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

/// Conflicts in the configured policy set. These are fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("access policy name {0:?} is defined more than once")]
    DuplicateName(String),
    #[error("access policies {first:?} and {second:?} share the same password")]
    DuplicatePassword { first: String, second: String },
}

/// Reasons a connection is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Unauthorized: policy {policy:?} already has {limit} sessions")]
    CapacityReached { policy: String, limit: usize },
}

/// Live sessions and the policy each one was admitted under.
#[derive(Debug)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<SessionId, Option<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Option<String>>> {
        // The map stays consistent even if a holder panicked
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of sessions currently connected ("clients online").
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of live sessions admitted under `policy`.
    pub fn count_for(&self, policy: &str) -> usize {
        self.lock()
            .values()
            .filter(|bound| bound.as_deref() == Some(policy))
            .count()
    }

    /// Registers a session, checking the cap under the same lock as the insert.
    fn register(&self, policy: Option<&AccessPolicy>) -> Result<SessionId, AccessError> {
        let mut live = self.lock();

        if let Some(AccessPolicy {
            name,
            max_sessions: Some(limit),
            ..
        }) = policy
        {
            let bound = live
                .values()
                .filter(|bound| bound.as_deref() == Some(name.as_str()))
                .count();
            if bound >= *limit {
                return Err(AccessError::CapacityReached {
                    policy: name.clone(),
                    limit: *limit,
                });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        live.insert(id, policy.map(|p| p.name.clone()));
        Ok(id)
    }

    fn remove(&self, id: SessionId) {
        self.lock().remove(&id);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of admission. Deregisters the session when dropped.
#[derive(Debug)]
pub struct SessionTicket {
    id: SessionId,
    policy: Option<String>,
    registry: Arc<SessionRegistry>,
}

impl SessionTicket {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Name of the policy this session was admitted under.
    pub fn policy(&self) -> Option<&str> {
        self.policy.as_deref()
    }
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        debug!("Session {} deregistered", self.id);
    }
}

/// Admits or refuses new connections.
#[derive(Debug)]
pub struct AccessGate {
    policies: Vec<AccessPolicy>,
    registry: Arc<SessionRegistry>,
}

impl AccessGate {
    /// Validates the policy set: names and passwords must both be unique.
    pub fn new(policies: Vec<AccessPolicy>) -> Result<Self, PolicyError> {
        let mut names = HashSet::new();
        let mut passwords: HashMap<&str, &str> = HashMap::new();
        for policy in &policies {
            if !names.insert(policy.name.as_str()) {
                return Err(PolicyError::DuplicateName(policy.name.clone()));
            }
            if let Some(first) = passwords.insert(policy.password.as_str(), policy.name.as_str()) {
                return Err(PolicyError::DuplicatePassword {
                    first: first.to_string(),
                    second: policy.name.clone(),
                });
            }
        }

        Ok(Self {
            policies,
            registry: Arc::new(SessionRegistry::new()),
        })
    }

    /// A gate without policies that admits everyone.
    pub fn open() -> Self {
        Self {
            policies: Vec::new(),
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn requires_password(&self) -> bool {
        !self.policies.is_empty()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Admits a connection presenting `credential`.
    ///
    /// # Arguments
    ///
    /// * `credential` - The password supplied at connection time, if any.
    ///
    /// # Returns
    ///
    /// A ticket registering the session, or the reason it was refused.
    pub fn admit(&self, credential: Option<&str>) -> Result<SessionTicket, AccessError> {
        let policy = if self.policies.is_empty() {
            None
        } else {
            let credential = credential.ok_or(AccessError::Unauthorized)?;
            let policy = self
                .policies
                .iter()
                .find(|p| p.password == credential)
                .ok_or(AccessError::Unauthorized)?;
            Some(policy)
        };

        let id = self.registry.register(policy).inspect_err(|e| {
            warn!("Refusing connection: {}", e);
        })?;

        Ok(SessionTicket {
            id,
            policy: policy.map(|p| p.name.clone()),
            registry: Arc::clone(&self.registry),
        })
    }
}
