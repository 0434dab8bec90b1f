//! Bluetooth advertising wrapper

use log::{info, warn};

use crate::error::EngineError;
use crate::radio::{BleEvent, BleRadio};

/// Makes the device discoverable and pairable under a fixed identity and
/// reports peer connect/disconnect events.
///
/// Every radio fault is mapped to [`EngineError::RadioUnavailable`]: the
/// engine has no fallback input channel, so a dead adapter is fatal.
pub struct BluetoothAdvertiser<R: BleRadio> {
    radio: R,
    identity: String,
    started: bool,
}

impl<R: BleRadio> BluetoothAdvertiser<R> {
    pub fn new(radio: R, identity: impl Into<String>) -> Self {
        Self { radio, identity: identity.into(), started: false }
    }

    /// Power the adapter, set the device name, open the pairing window.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        self.radio
            .power_on()
            .await
            .map_err(|e| EngineError::RadioUnavailable(e.to_string()))?;
        self.radio
            .set_alias(&self.identity)
            .await
            .map_err(|e| EngineError::RadioUnavailable(e.to_string()))?;
        self.radio
            .set_discoverable(true)
            .await
            .map_err(|e| EngineError::RadioUnavailable(e.to_string()))?;
        self.started = true;
        info!("advertising as {:?}, waiting for a phone to connect", self.identity);
        Ok(())
    }

    pub async fn set_discoverable(&mut self, on: bool) -> Result<(), EngineError> {
        self.radio
            .set_discoverable(on)
            .await
            .map_err(|e| EngineError::RadioUnavailable(e.to_string()))
    }

    pub async fn next_event(&mut self) -> Result<BleEvent, EngineError> {
        self.radio
            .next_event()
            .await
            .map_err(|e| EngineError::RadioUnavailable(e.to_string()))
    }

    /// Close the pairing window. Called on every orchestrator exit path so
    /// the device is never left silently pairable.
    pub async fn stop(&mut self) {
        if !self.started {
            return;
        }
        if let Err(e) = self.radio.set_discoverable(false).await {
            warn!("failed to restore non-discoverable state: {e}");
        }
        self.started = false;
    }
}
