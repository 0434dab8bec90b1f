//! Collaborator traits for the radio and network subsystems
//!
//! The engine never talks to BlueZ, wpa_supplicant or hostapd directly; it
//! drives these capability traits. Platform crates implement them against
//! the real system, tests implement them with scripts.

use pisetup_proto::SecurityType;

/// Connection topology change reported by the Bluetooth adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleEvent {
    PeerConnected { address: String },
    PeerDisconnected { address: String },
}

/// Bluetooth adapter control: identity, discoverability, connect events.
/// Does not interpret any payload.
pub trait BleRadio {
    type Error: std::fmt::Display;

    async fn power_on(&mut self) -> Result<(), Self::Error>;

    async fn set_alias(&mut self, name: &str) -> Result<(), Self::Error>;

    /// Toggle discoverable + pairable together
    async fn set_discoverable(&mut self, on: bool) -> Result<(), Self::Error>;

    /// Next connect/disconnect event. Events arriving while the engine is
    /// busy with a session must be buffered, not dropped.
    async fn next_event(&mut self) -> Result<BleEvent, Self::Error>;
}

/// GATT server hosting the writable credentials characteristic
pub trait GattHost {
    type Error: std::fmt::Display;

    /// Publish the credentials service. Registering twice without an
    /// intervening unregister is an implementation error.
    async fn register(&mut self) -> Result<(), Self::Error>;

    /// Tear the service down. Must leave no characteristic behind; the next
    /// register starts from a clean slate.
    async fn unregister(&mut self) -> Result<(), Self::Error>;

    /// Wait for the next raw write to the credentials characteristic.
    async fn next_write(&mut self) -> Result<Vec<u8>, Self::Error>;
}

/// Outcome of a P2P group negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Formed,
    Refused,
}

/// Network info a peer shares after group formation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub ssid: String,
    pub passphrase: Option<String>,
}

/// WiFi Direct / P2P control interface
pub trait P2pControl {
    type Error: std::fmt::Display;

    async fn start_find(&mut self) -> Result<(), Self::Error>;

    async fn stop_find(&mut self) -> Result<(), Self::Error>;

    /// Addresses of currently discovered peers
    async fn peers(&mut self) -> Result<Vec<String>, Self::Error>;

    /// Initiate push-button group negotiation with a discovered peer
    async fn connect(&mut self, address: &str) -> Result<Negotiation, Self::Error>;

    /// Network info shared by the peer, if the group formed and the peer
    /// offered any
    async fn group_info(&mut self) -> Result<Option<GroupInfo>, Self::Error>;

    /// Dissolve any group left over from this attempt. A no-op when no
    /// group exists.
    async fn remove_group(&mut self) -> Result<(), Self::Error>;
}

/// Temporary access point + DHCP + credential capture listener
pub trait HotspotControl {
    type Error: std::fmt::Display;

    async fn start(&mut self, ssid: &str, passphrase: &str) -> Result<(), Self::Error>;

    async fn stop(&mut self) -> Result<(), Self::Error>;

    /// Wait for the next credential payload submitted by an associated
    /// client. Association alone never resolves this.
    async fn next_submission(&mut self) -> Result<Vec<u8>, Self::Error>;
}

/// Association + IP state of the managed interface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub associated: bool,
    pub ip: Option<String>,
}

/// The operating system's network-configuration subsystem
pub trait NetworkStack {
    type Error: std::fmt::Display;

    /// Write a persistent network profile and trigger association. The
    /// declared security type selects key management; an open profile must
    /// not carry a PSK. An error means the stack refused the configuration
    /// outright; a wrong passphrase is not an error here, it shows up as a
    /// link that never comes up.
    async fn apply_profile(
        &mut self,
        ssid: &str,
        passphrase: Option<&str>,
        security: SecurityType,
    ) -> Result<(), Self::Error>;

    async fn link_status(&mut self) -> Result<LinkStatus, Self::Error>;
}
