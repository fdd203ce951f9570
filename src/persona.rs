//! One-shot identity name requests
//!
//! A name lookup for a remote identity may complete later, when the platform
//! reports a persona change. Each lookup is an explicit request stored under
//! its identity; the persona-change dispatcher completes and removes every
//! request for that identity on the first matching event.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::trace;

use crate::connection::NetIdentity;

/// Completion callback receiving the resolved name
pub type NameCallback = Box<dyn FnOnce(&str) + Send + Sync>;

/// Process-wide request table
pub static PERSONA_REQUESTS: Lazy<PersonaRequests> = Lazy::new(PersonaRequests::new);

/// Pending name requests keyed by identity
#[derive(Default)]
pub struct PersonaRequests {
    pending: DashMap<NetIdentity, Vec<NameCallback>>,
}

impl PersonaRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the name of `identity`
    ///
    /// With `known_name` set the callback completes immediately and nothing
    /// is queued; otherwise it waits for [`dispatch`](Self::dispatch).
    pub fn request<F>(&self, identity: NetIdentity, known_name: Option<&str>, callback: F)
    where
        F: FnOnce(&str) + Send + Sync + 'static,
    {
        if let Some(name) = known_name {
            callback(name);
            return;
        }
        trace!(%identity, "Queued name request");
        self.pending
            .entry(identity)
            .or_default()
            .push(Box::new(callback));
    }

    /// Persona-change event: complete every request for `identity`
    ///
    /// Returns how many callbacks ran. Callbacks run after the entry has been
    /// removed, so they may queue new requests.
    pub fn dispatch(&self, identity: &NetIdentity, name: &str) -> usize {
        let Some((_, callbacks)) = self.pending.remove(identity) else {
            return 0;
        };
        let completed = callbacks.len();
        for callback in callbacks {
            callback(name);
        }
        trace!(%identity, completed, "Completed name requests");
        completed
    }

    /// Drop all requests for `identity` without completing them
    pub fn cancel(&self, identity: &NetIdentity) -> usize {
        self.pending
            .remove(identity)
            .map(|(_, callbacks)| callbacks.len())
            .unwrap_or(0)
    }

    /// Identities with at least one waiting request
    pub fn pending_identities(&self) -> usize {
        self.pending.len()
    }
}
