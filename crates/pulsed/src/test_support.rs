//! In-memory collaborator and state helpers shared by unit tests.

use crate::backend::{Backend, BackendError, MachineEnrollForm, MachineRecord};
use crate::config::HubConfig;
use crate::server::HubState;
use async_trait::async_trait;
use dashmap::DashMap;
use pulse_common::telemetry::StaticData;
use pulse_common::{MachineId, UserId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Account backend stand-in: token tables plus call recording.
#[derive(Default)]
pub(crate) struct MockBackend {
    client_tokens: DashMap<String, UserId>,
    reporter_tokens: DashMap<String, MachineId>,
    pub(crate) static_writes: Mutex<Vec<(MachineId, StaticData)>>,
    pub(crate) create_calls: AtomicUsize,
    pub(crate) fail_create: AtomicBool,
    pub(crate) fail_persist: AtomicBool,
}

impl MockBackend {
    pub(crate) fn add_client_token(&self, token: &str, user: &str) {
        self.client_tokens.insert(token.to_string(), user.to_string());
    }

    pub(crate) fn add_reporter_token(&self, token: &str, machine: &str) {
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
        if self.fail_persist.load(Ordering::Relaxed) {
            return Err(BackendError::Status(500));
        }
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

pub(crate) fn test_config() -> HubConfig {
    HubConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        send_queue: 256,
        heartbeat_ms: 5000,
        pairing_ttl_ms: 60_000,
        ping_interval: 30,
        idle_timeout: 120,
    }
}

pub(crate) fn hub_state(backend: Arc<MockBackend>) -> Arc<HubState> {
    Arc::new(HubState::new(test_config(), backend))
}
