//! Committing credentials to the live network stack

use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;
use tokio::sync::Mutex;

use crate::credential::CredentialRecord;
use crate::error::CommitError;
use crate::radio::NetworkStack;
use crate::session::current_timestamp;

/// Connectivity observed after a commit attempt. Produced fresh every time;
/// never cached, since network conditions change between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityResult {
    pub connected: bool,
    pub assigned_address: Option<String>,
    pub checked_at: u64,
}

/// Applies a credential record to the network stack and reports the
/// resulting connectivity.
///
/// Bringing the same radio interface up and down concurrently is undefined,
/// so the stack sits behind a mutex: exactly one commit is in flight
/// system-wide. This is the engine's only cross-cutting lock.
pub struct NetworkCommitter<N: NetworkStack> {
    stack: Mutex<N>,
    verify_timeout: Duration,
    poll_interval: Duration,
}

impl<N: NetworkStack> NetworkCommitter<N> {
    pub fn new(stack: N, verify_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            stack: Mutex::new(stack),
            verify_timeout,
            poll_interval,
        }
    }

    /// Write the profile, trigger association, poll until the link is up or
    /// the verify window closes. A wrong passphrase surfaces as
    /// `connected: false`, not as an error; only an outright refusal of the
    /// profile is a [`CommitError::Rejected`].
    pub async fn commit(&self, record: &CredentialRecord) -> Result<ConnectivityResult, CommitError> {
        let mut stack = self.stack.lock().await;

        debug!("applying network profile for {:?}", record.ssid);
        stack
            .apply_profile(&record.ssid, record.passphrase.as_deref(), record.security)
            .await
            .map_err(|e| CommitError::Rejected(e.to_string()))?;

        let deadline = Instant::now() + self.verify_timeout;
        loop {
            match stack.link_status().await {
                Ok(status) if status.associated && status.ip.is_some() => {
                    return Ok(ConnectivityResult {
                        connected: true,
                        assigned_address: status.ip,
                        checked_at: current_timestamp(),
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("link status check failed: {e}"),
            }
            if Instant::now() >= deadline {
                return Ok(ConnectivityResult {
                    connected: false,
                    assigned_address: None,
                    checked_at: current_timestamp(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One-off link probe without touching the profile. Used for the status
    /// command and the startup resume check.
    pub async fn probe(&self) -> Option<crate::radio::LinkStatus> {
        let mut stack = self.stack.lock().await;
        match stack.link_status().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("link status check failed: {e}");
                None
            }
        }
    }
}
