use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pulse_common::telemetry::StaticData;
use pulse_common::{MachineId, UserId};
use pulsed::backend::{Backend, BackendError, MachineEnrollForm, MachineRecord};
use pulsed::config::HubConfig;
use pulsed::HubState;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// In-memory account backend for integration tests.
#[derive(Default)]
pub struct MockBackend {
    client_tokens: DashMap<String, UserId>,
    reporter_tokens: DashMap<String, MachineId>,
    pub static_writes: Mutex<Vec<(MachineId, StaticData)>>,
    pub create_calls: AtomicUsize,
    pub fail_create: AtomicBool,
}

impl MockBackend {
    pub fn add_client_token(&self, token: &str, user: &str) {
        self.client_tokens.insert(token.to_string(), user.to_string());
    }

    pub fn add_reporter_token(&self, token: &str, machine: &str) {
        self.reporter_tokens
            .insert(token.to_string(), machine.to_string());
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn authenticate_client(&self, auth_token: &str) -> Result<UserId, BackendError> {
        self.client_tokens
            .get(auth_token)
            .map(|entry| entry.value().clone())
            .ok_or(BackendError::AuthenticationFailed)
    }

    async fn authenticate_reporter(&self, auth_token: &str) -> Result<MachineId, BackendError> {
        self.reporter_tokens
            .get(auth_token)
            .map(|entry| entry.value().clone())
            .ok_or(BackendError::AuthenticationFailed)
    }

    async fn persist_static_data(
        &self,
        machine: &MachineId,
        data: StaticData,
    ) -> Result<(), BackendError> {
        self.static_writes
            .lock()
            .unwrap()
            .push((machine.clone(), data));
        Ok(())
    }

    async fn create_machine(
        &self,
        owner: &UserId,
        form: MachineEnrollForm,
    ) -> Result<MachineRecord, BackendError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_create.load(Ordering::Relaxed) {
            return Err(BackendError::Rejected("hardware_uuid is invalid".into()));
        }
        Ok(MachineRecord {
            uuid: format!("machine-for-{}", form.hardware_uuid),
            owner_uuid: owner.clone(),
            name: form.hostname,
            access_token: "machine-access-token".to_string(),
        })
    }
}

pub fn test_config(listen: SocketAddr) -> HubConfig {
    HubConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        send_queue: 256,
        // Long heartbeat by default so it doesn't interleave with the
        // events a test is asserting on.
        heartbeat_ms: 60_000,
        pairing_ttl_ms: 60_000,
        ping_interval: 30,
        idle_timeout: 120,
    }
}

pub async fn start_hub() -> (SocketAddr, Arc<HubState>, Arc<MockBackend>) {
    start_hub_with(|_| {}).await
}

pub async fn start_hub_with(
    tweak: impl FnOnce(&mut HubConfig),
) -> (SocketAddr, Arc<HubState>, Arc<MockBackend>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    tweak(&mut config);

    let backend = Arc::new(MockBackend::default());
    let state = Arc::new(HubState::new(config, backend.clone()));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = pulsed::run(listener, state_clone).await {
            eprintln!("hub error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state, backend)
}

/// Poll a condition every 10ms for up to 2s.
pub async fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

pub fn dynamic_data_frame(process_count: u32) -> String {
    json!({"e": "dynamicData", "d": {
        "cpu": {"usage": [25.0, 75.0], "freq": [1200.0, 1800.0]},
        "ram": {"total": 16_000, "used": 4_000},
        "swap": {"total": 2_000, "used": 0},
        "disks": [{"fs": "/dev/sda1", "mount": "/", "type": "ext4", "total": 500, "used": 250}],
        "process_count": process_count,
        "network": [{"name": "eth0", "tx": 2_000_000u64, "rx": 4_000_000u64, "speed": 1000.0}],
        "host_uptime": 1000,
        "reporter_uptime": 10
    }})
    .to_string()
}

pub struct TestConn {
    ws_tx: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    ws_rx: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl TestConn {
    pub async fn connect(addr: &SocketAddr, path: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
            .await
            .unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    pub async fn send_frame(&mut self, frame: String) {
        self.ws_tx.send(Message::Text(frame)).await.unwrap();
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) {
        self.ws_tx.send(Message::Binary(data)).await.unwrap();
    }

    pub async fn login(&mut self, token: &str) {
        self.send_frame(json!({"e": "login", "d": {"auth_token": token}}).to_string())
            .await;
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
    }

    /// Receive the next event within `wait`, or `None` if the connection
    /// closed or nothing arrived in time.
    pub async fn try_recv_event(&mut self, wait: Duration) -> Option<(String, Value)> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let msg = match tokio::time::timeout_at(deadline, self.ws_rx.next()).await {
                Ok(msg) => msg,
                Err(_) => return None,
            };
            match msg {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    let event = value["e"].as_str().unwrap().to_string();
                    let payload = value.get("d").cloned().unwrap_or(Value::Null);
                    return Some((event, payload));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => {}
                Some(Err(_)) => return None,
            }
        }
    }

    pub async fn recv_event(&mut self) -> (String, Value) {
        self.try_recv_event(Duration::from_secs(5))
            .await
            .expect("timed out waiting for event")
    }

    /// Receive the next `machineData` event, skipping heartbeats.
    pub async fn recv_machine_data(&mut self) -> Value {
        loop {
            let (event, payload) = self.recv_event().await;
            if event == "machineData" {
                return payload;
            }
        }
    }
}
