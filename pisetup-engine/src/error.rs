#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The Bluetooth adapter could not be powered on or was lost. Fatal:
    /// without the radio the device has no way to meet a phone, so this is
    /// surfaced to the operator instead of being retried.
    #[error("bluetooth adapter unavailable: {0}")]
    RadioUnavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The network stack refused the profile outright. Treated like a
    /// failed connectivity check by the orchestrator.
    #[error("network stack rejected the profile: {0}")]
    Rejected(String),
}
