//! Peer sessions and per-strategy attempt bookkeeping

use std::time::{SystemTime, UNIX_EPOCH};

use pisetup_proto::CredentialPayload;

use crate::credential::StrategyKind;

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    ExtractionInProgress,
    Extracted,
    Failed,
}

/// One phone being walked through the provisioning flow. At most one
/// session is processed at a time; further connections queue behind it.
#[derive(Debug, Clone)]
pub struct PeerSession {
    /// Bluetooth address (or P2P device address) of the peer
    pub peer: String,
    pub connected_at: u64,
    pub state: SessionState,
}

impl PeerSession {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            connected_at: current_timestamp(),
            state: SessionState::Connected,
        }
    }
}

/// Result of one strategy invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Not yet resolved
    Pending,
    /// Peer handed over a raw credential payload
    Success(CredentialPayload),
    /// No peer action within the attempt window
    Timeout,
    /// Peer-provided payload was structurally invalid, or the peer
    /// explicitly refused. Expected; drives strategy advancement.
    Rejected(String),
    /// Unexpected collaborator fault. Abandons the current peer.
    Error(String),
}

/// Transient record of a single strategy invocation; lives only for logging
/// during one attempt, never persisted.
#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    pub peer: String,
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
}

impl StrategyAttempt {
    pub fn new(strategy: StrategyKind, peer: &PeerSession, attempt_number: u32) -> Self {
        Self {
            strategy,
            peer: peer.peer.clone(),
            attempt_number,
            outcome: AttemptOutcome::Pending,
        }
    }
}
