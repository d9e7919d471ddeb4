//! Telemetry data shapes carried by the wire events.
//!
//! [`StaticData`] and [`DynamicData`] are produced by reporters;
//! [`MachineData`] is the client-facing shape the hub derives from a
//! [`DynamicData`] snapshot before fan-out.

use serde::{Deserialize, Serialize};

/// Machine descriptor sent once per reporter session via `staticData`.
///
/// Everything is optional except the fields a reporter can always read
/// locally; geolocation-derived fields are filled in downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticData {
    /// Machine hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// OS name (Windows, Arch Linux, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    /// OS version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    /// ISO country code, derived from the public IP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Public IP address of the machine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    /// Number of physical CPU cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    /// CPU model string.
    pub cpu_model: String,
    /// Number of CPU threads.
    pub cpu_threads: u32,
    /// Total memory in bytes.
    pub total_mem: u64,
    /// Version of the reporter sending this descriptor.
    pub reporter_version: String,
}

/// Per-core CPU usage and frequency samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cpu {
    /// Usage percentage per core.
    pub usage: Vec<f64>,
    /// Frequency in MHz per core.
    pub freq: Vec<f64>,
}

/// Memory totals in bytes. Also used for swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ram {
    /// Total bytes.
    pub total: u64,
    /// Used bytes.
    pub used: u64,
}

/// Swap totals share the memory shape.
pub type Swap = Ram;

/// GPU vendor and load snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gpu {
    /// GPU brand string.
    pub brand: String,
    /// GPU utilization percentage.
    pub gpu_usage: f64,
    /// Power draw in watts.
    pub power_usage: f64,
}

/// One mounted filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    /// Filesystem device.
    pub fs: String,
    /// Mount point.
    pub mount: String,
    /// Filesystem type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Total bytes.
    pub total: u64,
    /// Used bytes.
    pub used: u64,
}

/// One temperature sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temp {
    /// Sensor label.
    pub label: String,
    /// Temperature in degrees Celsius.
    pub value: f64,
}

/// One network interface as reported by a reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Interface name.
    pub name: String,
    /// Bytes transmitted since the last snapshot.
    pub tx: u64,
    /// Bytes received since the last snapshot.
    pub rx: u64,
    /// Link speed in Mbps.
    pub speed: f64,
}

/// One network interface in the compact client-facing form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCompact {
    /// Interface name.
    pub n: String,
    /// Bytes transmitted since the last snapshot.
    pub tx: u64,
    /// Bytes received since the last snapshot.
    pub rx: u64,
    /// Link speed in Mbps.
    pub s: f64,
}

/// Live metrics snapshot sent by a reporter via `dynamicData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicData {
    /// CPU samples.
    pub cpu: Cpu,
    /// Memory totals.
    pub ram: Ram,
    /// Swap totals.
    pub swap: Swap,
    /// GPU snapshot, when the machine has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Gpu>,
    /// Mounted filesystems.
    pub disks: Vec<Disk>,
    /// Number of running processes.
    pub process_count: u32,
    /// Temperature sensors, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temps: Option<Vec<Temp>>,
    /// Network interfaces.
    pub network: Vec<NetworkInterface>,
    /// Host uptime in seconds.
    pub host_uptime: u64,
    /// Reporter process uptime in seconds.
    pub reporter_uptime: u64,
}

/// Client-facing snapshot: the `dynamicData` fields passed through, the
/// reporting machine's identity, and a few precomputed aggregates so
/// dashboards don't recompute them per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineData {
    /// Identity of the reporting machine.
    pub uuid: String,
    /// CPU samples.
    pub cpu: Cpu,
    /// Memory totals.
    pub ram: Ram,
    /// Swap totals.
    pub swap: Swap,
    /// GPU snapshot, when the machine has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Gpu>,
    /// Mounted filesystems.
    pub disks: Vec<Disk>,
    /// Number of running processes.
    pub process_count: u32,
    /// Temperature sensors, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temps: Option<Vec<Temp>>,
    /// Network interfaces, compact form.
    pub network: Vec<NetworkCompact>,
    /// Host uptime in seconds.
    pub host_uptime: u64,
    /// Reporter process uptime in seconds.
    pub reporter_uptime: u64,
    /// Mean CPU usage across cores, truncated to a whole percent.
    pub cau: u32,
    /// Mean CPU frequency across cores, truncated to whole MHz.
    pub cas: u32,
    /// Total download across interfaces, in megabytes.
    pub td: f64,
    /// Total upload across interfaces, in megabytes.
    pub tu: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_type_field_uses_wire_name() {
        let disk = Disk {
            fs: "/dev/sda1".into(),
            mount: "/".into(),
            kind: "ext4".into(),
            total: 100,
            used: 40,
        };
        let json = serde_json::to_value(&disk).unwrap();
        assert_eq!(json["type"], "ext4");
        let back: Disk = serde_json::from_value(json).unwrap();
        assert_eq!(back, disk);
    }

    #[test]
    fn dynamic_data_omits_absent_gpu_and_temps() {
        let json = serde_json::to_value(DynamicData::default()).unwrap();
        assert!(json.get("gpu").is_none());
        assert!(json.get("temps").is_none());
    }

    #[test]
    fn dynamic_data_decodes_from_reporter_json() {
        let data: DynamicData = serde_json::from_str(
            r#"{
                "cpu": {"usage": [10.0, 30.0], "freq": [1400.0, 1600.0]},
                "ram": {"total": 16, "used": 8},
                "swap": {"total": 4, "used": 0},
                "disks": [],
                "process_count": 120,
                "network": [{"name": "eth0", "tx": 1000, "rx": 2000, "speed": 1000.0}],
                "host_uptime": 3600,
                "reporter_uptime": 60
            }"#,
        )
        .unwrap();
        assert_eq!(data.cpu.usage, vec![10.0, 30.0]);
        assert_eq!(data.network[0].name, "eth0");
        assert!(data.gpu.is_none());
    }
}
