//! Platform collaborators for a BlueZ + wpa_supplicant system
//!
//! These implement the engine's radio traits against the stock Raspberry
//! Pi OS tool set: `bluetoothctl` for adapter control and the GATT
//! service, `wpa_cli` for P2P and station-mode configuration, `hostapd` +
//! `dnsmasq` plus an HTTP capture listener for the fallback hotspot.

mod bluez;
mod hotspot;
mod wpa;

pub use bluez::{BluezCtl, BluezGatt};
pub use hotspot::HostapdHotspot;
pub use wpa::WpaCli;
