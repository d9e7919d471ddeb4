//! Periodic liveness broadcast to dashboard clients.

use crate::metrics::counters;
use crate::server::HubState;
use pulse_common::wire::OutboundEvent;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;

/// Broadcast `heartbeat` to every client sink on a fixed interval until the
/// shutdown signal fires.
///
/// Started once at hub startup; its only coupling to the rest of the hub is
/// the client registry's broadcast contract.
pub async fn run(state: Arc<HubState>, mut shutdown: watch::Receiver<()>) {
    let mut ticker = interval(state.config.heartbeat_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = state.clients.broadcast(&OutboundEvent::Heartbeat);
                counters::heartbeats_sent_total(outcome.delivered as u64);
                if outcome.evicted > 0 {
                    counters::sinks_evicted_total("client", outcome.evicted as u64);
                }
            }
            _ = shutdown.changed() => {
                tracing::info!("heartbeat scheduler stopped");
                return;
            }
        }
    }
}
