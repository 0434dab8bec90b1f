//! pisetup engine - WiFi credential acquisition for headless devices
//!
//! The device advertises itself over Bluetooth; when a phone connects, the
//! engine works through its configured extraction strategies in priority
//! order (GATT characteristic write, WiFi Direct handshake, capture
//! hotspot) until one yields a credential payload. The payload is
//! validated, persisted, committed to the local network stack, and the
//! resulting connectivity decides whether the engine is done, retries, or
//! falls through to the next strategy.
//!
//! Radio and network access is abstracted behind the traits in [`radio`];
//! platform crates implement them (the daemon drives bluetoothctl,
//! wpa_cli, and hostapd), tests use scripted mocks.

mod advertiser;
mod backoff;
mod committer;
mod credential;
mod error;
mod orchestrator;
pub mod radio;
mod session;
mod store;
mod strategy;

pub use advertiser::BluetoothAdvertiser;
pub use backoff::Backoff;
pub use committer::{ConnectivityResult, NetworkCommitter};
pub use credential::{CredentialRecord, StrategyKind};
pub use error::{CommitError, EngineError};
pub use orchestrator::{EngineConfig, EngineState, Orchestrator, PeerOutcome};
pub use session::{AttemptOutcome, PeerSession, SessionState, StrategyAttempt, current_timestamp};
pub use store::CredentialStore;
pub use strategy::{GattWrite, HotspotShare, Strategy, WifiDirectHandshake};

// Re-export the payload types collaborators exchange
pub use pisetup_proto::{CredentialPayload, PayloadError, SecurityType};
