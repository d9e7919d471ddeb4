//! Seam to the account backend.
//!
//! The hub never issues tokens, hashes passwords, or touches the document
//! store; it asks the account backend to resolve credentials into principal
//! identities, to persist machine descriptors, and to create machine
//! records during enrollment. [`HttpBackend`] is the production
//! implementation against the backend's internal API; tests substitute an
//! in-memory one.

use async_trait::async_trait;
use pulse_common::telemetry::StaticData;
use pulse_common::{MachineId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the account backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The supplied token did not resolve to a principal.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// The backend rejected the request outright.
    #[error("backend rejected request: {0}")]
    Rejected(String),
    /// The backend answered with an unexpected status code.
    #[error("unexpected backend status: {0}")]
    Status(u16),
    /// HTTP transport error.
    #[error("backend transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Form data a reporter submits when enrolling a new machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineEnrollForm {
    /// Hardware UUID read from the machine's firmware.
    pub hardware_uuid: String,
    /// Hostname the machine will be listed under.
    pub hostname: String,
}

/// A machine record as returned by the account backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Machine identity.
    pub uuid: MachineId,
    /// Identity of the owning user.
    pub owner_uuid: UserId,
    /// Display name.
    pub name: String,
    /// Access token the reporter will log in with.
    pub access_token: String,
}

/// Operations the hub delegates to the account backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Resolve a dashboard client's token into a user identity.
    async fn authenticate_client(&self, auth_token: &str) -> Result<UserId, BackendError>;

    /// Resolve a reporter's token into a machine identity.
    async fn authenticate_reporter(&self, auth_token: &str) -> Result<MachineId, BackendError>;

    /// Persist a machine's static descriptor.
    async fn persist_static_data(
        &self,
        machine: &MachineId,
        data: StaticData,
    ) -> Result<(), BackendError>;

    /// Create a machine record owned by `owner`.
    async fn create_machine(
        &self,
        owner: &UserId,
        form: MachineEnrollForm,
    ) -> Result<MachineRecord, BackendError>;
}

#[derive(Serialize)]
struct TokenBody<'a> {
    auth_token: &'a str,
}

#[derive(Deserialize)]
struct PrincipalBody {
    uuid: String,
}

#[derive(Serialize)]
struct CreateMachineBody<'a> {
    owner_uuid: &'a str,
    hardware_uuid: String,
    hostname: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`Backend`] implementation against the account backend's internal HTTP
/// API, authenticated with a service bearer token.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    /// Create a backend client for the given base URL and service token.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/internal/v1{path}", self.base_url)
    }

    async fn resolve_principal(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(&TokenBody { auth_token })
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(response.json::<PrincipalBody>().await?.uuid),
            401 | 403 => Err(BackendError::AuthenticationFailed),
            status => Err(BackendError::Status(status)),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn authenticate_client(&self, auth_token: &str) -> Result<UserId, BackendError> {
        self.resolve_principal("/auth/client", auth_token).await
    }

    async fn authenticate_reporter(&self, auth_token: &str) -> Result<MachineId, BackendError> {
        self.resolve_principal("/auth/reporter", auth_token).await
    }

    async fn persist_static_data(
        &self,
        machine: &MachineId,
        data: StaticData,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .put(self.url(&format!("/machines/{machine}/static")))
            .bearer_auth(&self.token)
            .json(&data)
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 204 => Ok(()),
            status => Err(BackendError::Status(status)),
        }
    }

    async fn create_machine(
        &self,
        owner: &UserId,
        form: MachineEnrollForm,
    ) -> Result<MachineRecord, BackendError> {
        let response = self
            .http
            .post(self.url("/machines"))
            .bearer_auth(&self.token)
            .json(&CreateMachineBody {
                owner_uuid: owner,
                hardware_uuid: form.hardware_uuid,
                hostname: form.hostname,
            })
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 201 => Ok(response.json::<MachineRecord>().await?),
            400 | 422 => {
                let reason = response
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.error)
                    .unwrap_or_else(|_| "invalid machine form".to_string());
                Err(BackendError::Rejected(reason))
            }
            status => Err(BackendError::Status(status)),
        }
    }
}
