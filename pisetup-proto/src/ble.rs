//! BLE GATT Service Protocol Constants for pisetup WiFi Provisioning
//!
//! This module defines the BLE service/characteristic UUIDs a phone-side
//! client uses to hand the device WiFi credentials over GATT.

use uuid::Uuid;

/// BLE Service UUID: 7a5e1000-90ab-4d2e-0000-000000000000
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x7a5e1000_90ab_4d2e_0000_000000000000);

/// Credentials Characteristic UUID (write) - one NUL-separated frame per write
pub const CREDENTIALS_UUID: Uuid = Uuid::from_u128(0x7a5e1001_90ab_4d2e_0000_000000000000);
