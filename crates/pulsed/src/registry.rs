use dashmap::DashMap;
use pulse_common::wire::OutboundEvent;
use std::time::Instant;
use tokio::sync::mpsc;

/// The two kinds of hub connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dashboard connection subscribing to telemetry.
    Client,
    /// Monitored host's telemetry-sending connection.
    Reporter,
}

impl Role {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Reporter => "reporter",
        }
    }
}

/// Handle held in the registry — used to push events to a connection's task.
#[derive(Clone, Debug)]
pub struct SinkHandle {
    /// Channel sender for delivering events to this connection's task.
    pub tx: mpsc::Sender<OutboundEvent>,
    /// Instant when this sink was registered (used for eviction guards).
    pub registered_at: Instant,
}

impl SinkHandle {
    /// Wrap a sender, stamping the registration instant.
    #[must_use]
    pub fn new(tx: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            tx,
            registered_at: Instant::now(),
        }
    }
}

/// Outcome of one broadcast pass over a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Sinks the event was queued to.
    pub delivered: usize,
    /// Sinks skipped because their queue was full.
    pub dropped_full: usize,
    /// Sinks removed because their connection was gone.
    pub evicted: usize,
}

/// Concurrent principal-identity → connection-sink table for one role.
///
/// At most one live sink per identity: registering an identity that already
/// has one replaces it, and the previous handle is returned for the caller
/// to close. The registry never closes sinks itself.
#[derive(Debug)]
pub struct Registry {
    role: Role,
    sinks: DashMap<String, SinkHandle>,
}

impl Registry {
    /// Create an empty registry for the given role.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            sinks: DashMap::new(),
        }
    }

    /// Role this registry tracks.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Insert a sink, returning any previous sink for the same identity.
    #[must_use]
    pub fn register(&self, identity: &str, handle: SinkHandle) -> Option<SinkHandle> {
        self.sinks.insert(identity.to_string(), handle)
    }

    /// Remove the entry if present; no-op otherwise.
    pub fn unregister(&self, identity: &str) {
        self.sinks.remove(identity);
    }

    /// Remove the entry only if it was registered at the given instant.
    ///
    /// A session closing late must not evict the sink that replaced it.
    pub fn remove_if(&self, identity: &str, registered_at: Instant) {
        self.sinks
            .remove_if(identity, |_k, v| v.registered_at == registered_at);
    }

    /// Look up the sink for an identity.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<SinkHandle> {
        self.sinks.get(identity).map(|entry| entry.value().clone())
    }

    /// Number of live sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` if no sinks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `event` to every current sink, best-effort and independently
    /// per sink.
    ///
    /// Iterates a snapshot of the table so concurrent register/unregister
    /// cannot corrupt the pass. A sink whose queue is full loses this event
    /// only; a sink whose connection is gone is unregistered on the spot.
    pub fn broadcast(&self, event: &OutboundEvent) -> BroadcastOutcome {
        let snapshot: Vec<(String, SinkHandle)> = self
            .sinks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut outcome = BroadcastOutcome::default();
        for (identity, handle) in snapshot {
            match handle.tx.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(role = self.role.as_str(), %identity, "sink queue full, dropping event");
                    outcome.dropped_full += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(role = self.role.as_str(), %identity, "sink gone, unregistering");
                    self.remove_if(&identity, handle.registered_at);
                    outcome.evicted += 1;
                }
            }
        }
        outcome
    }
}
