use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// CLI arguments for the telemetry hub.
#[derive(Parser, Debug, Clone)]
#[command(name = "pulsed")]
#[command(about = "pulse telemetry relay hub")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "PULSED_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "PULSED_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "10000", env = "PULSED_MAX_CONNS")]
    pub max_conns: usize,
    /// Per-connection outbound queue capacity in events.
    #[arg(long, default_value = "256", env = "PULSED_SEND_QUEUE")]
    pub send_queue: usize,
    /// Interval between client heartbeat events in milliseconds.
    #[arg(long, default_value = "5000", env = "PULSED_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,
    /// Pairing key lifetime in milliseconds.
    #[arg(long, default_value = "60000", env = "PULSED_PAIRING_TTL_MS")]
    pub pairing_ttl_ms: u64,
    /// Interval between WebSocket pings in seconds.
    #[arg(long, default_value = "30", env = "PULSED_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    #[arg(long, default_value = "120", env = "PULSED_IDLE_TIMEOUT")]
    pub idle_timeout: u64,
    /// Base URL of the account backend's internal API.
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "PULSED_BACKEND_URL")]
    pub backend_url: String,
    /// Service token for the account backend's internal API.
    #[arg(long, default_value = "", env = "PULSED_BACKEND_TOKEN")]
    pub backend_token: String,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Per-connection outbound queue capacity in events.
    pub send_queue: usize,
    /// Interval between client heartbeat events in milliseconds.
    pub heartbeat_ms: u64,
    /// Pairing key lifetime in milliseconds.
    pub pairing_ttl_ms: u64,
    /// Interval between WebSocket pings in seconds.
    pub ping_interval: u64,
    /// Connection idle timeout in seconds.
    pub idle_timeout: u64,
}

impl HubConfig {
    /// Validates the configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns a description of the first out-of-bounds value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        if self.send_queue == 0 {
            return Err("send_queue must be greater than 0".to_string());
        }
        if self.send_queue > 65_536 {
            return Err("send_queue exceeds reasonable limit (65,536 events)".to_string());
        }

        if self.heartbeat_ms == 0 {
            return Err("heartbeat_ms must be greater than 0".to_string());
        }
        if self.heartbeat_ms > 3_600_000 {
            return Err("heartbeat_ms exceeds reasonable limit (1 hour)".to_string());
        }

        if self.pairing_ttl_ms == 0 {
            return Err("pairing_ttl_ms must be greater than 0".to_string());
        }
        if self.pairing_ttl_ms > 86_400_000 {
            return Err("pairing_ttl_ms exceeds reasonable limit (1 day)".to_string());
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.idle_timeout == 0 {
            return Err("idle_timeout must be greater than 0".to_string());
        }
        if self.idle_timeout > 86_400 {
            return Err(
                "idle_timeout exceeds reasonable limit (86400 seconds / 1 day)".to_string(),
            );
        }
        Ok(())
    }

    /// Heartbeat period as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Pairing key lifetime as a [`Duration`].
    #[must_use]
    pub fn pairing_ttl(&self) -> Duration {
        Duration::from_millis(self.pairing_ttl_ms)
    }
}

impl From<Args> for HubConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            send_queue: args.send_queue,
            heartbeat_ms: args.heartbeat_ms,
            pairing_ttl_ms: args.pairing_ttl_ms,
            ping_interval: args.ping_interval,
            idle_timeout: args.idle_timeout,
        }
    }
}
