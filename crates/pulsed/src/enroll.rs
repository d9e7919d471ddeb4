//! Machine enrollment: pairing-key issue and redemption.
//!
//! This is the hub surface the rest of the backend calls when a user wants
//! to add a machine: the dashboard asks for a pairing key, the new
//! reporter submits it together with its machine form, and the hub
//! authorizes creation of the machine record against the key's owner.

use crate::backend::{BackendError, MachineEnrollForm, MachineRecord};
use crate::keys::IssuedKey;
use crate::metrics::counters;
use crate::server::HubState;
use thiserror::Error;

/// Errors surfaced by an enrollment attempt.
#[derive(Error, Debug)]
pub enum EnrollmentError {
    /// The pairing key is unknown, expired, or owned by someone else.
    #[error("pairing key invalid or expired")]
    KeyInvalid,
    /// The account backend refused to create the machine record.
    #[error("machine creation failed: {0}")]
    MachineCreation(#[source] BackendError),
}

impl HubState {
    /// Issue a pairing key bound to `owner`, returning the key text and its
    /// absolute expiry time for the caller to report to the user.
    pub fn issue_pairing_key(&self, owner: &str) -> IssuedKey {
        counters::pairing_keys_issued_total();
        let issued = self.keys.issue(owner);
        tracing::info!(owner, "issued pairing key");
        issued
    }

    /// Revoke a pairing key ahead of its TTL. Returns `true` if it existed.
    pub fn revoke_pairing_key(&self, key: &str) -> bool {
        self.keys.revoke(key)
    }

    /// Authorize creation of a machine record with a pairing key.
    ///
    /// The key resolves to its owner; if the request is itself
    /// authenticated, the asserted identity must match that owner. Only
    /// then is the account backend asked to create the record.
    ///
    /// # Errors
    ///
    /// [`EnrollmentError::KeyInvalid`] if the key is unknown or mismatched
    /// (with zero backend calls made); [`EnrollmentError::MachineCreation`]
    /// if the backend refuses the record.
    pub async fn enroll(
        &self,
        candidate_key: &str,
        form: MachineEnrollForm,
        asserted_owner: Option<&str>,
    ) -> Result<MachineRecord, EnrollmentError> {
        let Some(owner) = self.keys.redeem(candidate_key) else {
            counters::pairing_keys_redeemed_total("invalid");
            return Err(EnrollmentError::KeyInvalid);
        };

        if let Some(asserted) = asserted_owner {
            if asserted != owner {
                tracing::debug!(%owner, asserted, "pairing key owner mismatch");
                counters::pairing_keys_redeemed_total("invalid");
                return Err(EnrollmentError::KeyInvalid);
            }
        }
        counters::pairing_keys_redeemed_total("ok");

        let record = self
            .backend
            .create_machine(&owner, form)
            .await
            .map_err(EnrollmentError::MachineCreation)?;
        tracing::info!(machine = %record.uuid, %owner, "machine enrolled");
        Ok(record)
    }
}
