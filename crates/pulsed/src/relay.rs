//! Fan-out of reporter telemetry to dashboard clients.
//!
//! A `dynamicData` snapshot from an authenticated reporter is transformed
//! into the client-facing `machineData` shape and broadcast to every
//! registered client sink. No ownership filtering is applied: all clients
//! see all machines.

use crate::metrics::{counters, histograms};
use crate::server::HubState;
use pulse_common::telemetry::{DynamicData, MachineData, NetworkCompact};
use pulse_common::wire::OutboundEvent;
use std::time::Instant;

fn truncated_mean(samples: &[f64]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    (samples.iter().sum::<f64>() / samples.len() as f64) as u32
}

/// Build the client-facing snapshot for one reporter's `dynamicData`.
///
/// Passes the metrics through field-for-field, tags the reporting machine's
/// identity, renames network interfaces to the compact wire form, and
/// precomputes the aggregates dashboards chart directly: mean CPU usage and
/// frequency, and total download/upload in megabytes.
#[must_use]
pub fn machine_data(uuid: &str, data: DynamicData) -> MachineData {
    let cau = truncated_mean(&data.cpu.usage);
    let cas = truncated_mean(&data.cpu.freq);
    let td = data.network.iter().map(|n| n.rx).sum::<u64>() as f64 / 1000.0 / 1000.0;
    let tu = data.network.iter().map(|n| n.tx).sum::<u64>() as f64 / 1000.0 / 1000.0;
    let network = data
        .network
        .into_iter()
        .map(|n| NetworkCompact {
            n: n.name,
            tx: n.tx,
            rx: n.rx,
            s: n.speed,
        })
        .collect();

    MachineData {
        uuid: uuid.to_string(),
        cpu: data.cpu,
        ram: data.ram,
        swap: data.swap,
        gpu: data.gpu,
        disks: data.disks,
        process_count: data.process_count,
        temps: data.temps,
        network,
        host_uptime: data.host_uptime,
        reporter_uptime: data.reporter_uptime,
        cau,
        cas,
        td,
        tu,
    }
}

/// Transform one reporter snapshot and broadcast it to every client sink.
///
/// Best-effort per sink; a client whose connection is gone is unregistered
/// by the broadcast itself. Events from one reporter are relayed in the
/// order its session processes them.
pub fn relay_dynamic_data(state: &HubState, machine: &str, data: DynamicData) {
    let start = Instant::now();
    let event = OutboundEvent::MachineData(machine_data(machine, data));
    let outcome = state.clients.broadcast(&event);

    counters::telemetry_relayed_total();
    if outcome.evicted > 0 {
        counters::sinks_evicted_total("client", outcome.evicted as u64);
    }
    histograms::relay_fanout_seconds(start.elapsed().as_secs_f64());

    tracing::trace!(
        %machine,
        delivered = outcome.delivered,
        dropped = outcome.dropped_full,
        evicted = outcome.evicted,
        "relayed dynamic data"
    );
}
