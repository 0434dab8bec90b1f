//! The provisioning state machine
//!
//! Idle -> Advertising -> ExtractingViaStrategy(i) -> Validating ->
//! Committing -> Verifying -> {Succeeded | Retrying | Exhausted}
//!
//! One peer session at a time; connects that arrive while a session is in
//! flight queue FIFO. Timeout/Rejected advances to the next strategy, a
//! failed connectivity check retries the same strategy up to the configured
//! bound, a collaborator Error abandons the peer, and an exhausted session
//! re-opens the pairing window after an exponential backoff.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::advertiser::BluetoothAdvertiser;
use crate::backoff::Backoff;
use crate::committer::NetworkCommitter;
use crate::credential::CredentialRecord;
use crate::error::{CommitError, EngineError};
use crate::radio::{BleEvent, BleRadio, GattHost, HotspotControl, NetworkStack, P2pControl};
use crate::session::{AttemptOutcome, PeerSession, SessionState, StrategyAttempt};
use crate::store::CredentialStore;
use crate::strategy::Strategy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bluetooth identity the device advertises under
    pub device_name: String,
    /// Window each strategy attempt gets before it times out
    pub attempt_timeout: Duration,
    /// Commit attempts per strategy before advancing to the next one
    pub max_retries: u32,
    /// Backoff bounds for Exhausted -> Advertising
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Commit a previously stored record once at startup before advertising
    pub resume_stored: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_name: "PiWiFiSetup".to_string(),
            attempt_timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            resume_stored: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Advertising,
    ExtractingViaStrategy(usize),
    Validating,
    Committing,
    Verifying,
    Succeeded,
    Retrying,
    Exhausted,
}

/// Terminal outcome of one peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerOutcome {
    /// Credentials committed and verified; no further extraction attempts
    /// until the engine is reset
    Succeeded,
    /// Every configured strategy failed for this peer
    Exhausted,
    /// A collaborator fault mid-extraction; hardware-level errors are
    /// unlikely to be strategy-specific, so the peer is dropped immediately
    Abandoned,
}

pub struct Orchestrator<R, G, P, H, N>
where
    R: BleRadio,
    G: GattHost,
    P: P2pControl,
    H: HotspotControl,
    N: NetworkStack,
{
    advertiser: BluetoothAdvertiser<R>,
    strategies: Vec<Strategy<G, P, H>>,
    store: CredentialStore,
    committer: NetworkCommitter<N>,
    config: EngineConfig,
    state: EngineState,
    queue: VecDeque<PeerSession>,
    backoff: Backoff,
    provisioned: bool,
}

impl<R, G, P, H, N> Orchestrator<R, G, P, H, N>
where
    R: BleRadio,
    G: GattHost,
    P: P2pControl,
    H: HotspotControl,
    N: NetworkStack,
{
    pub fn new(
        radio: R,
        strategies: Vec<Strategy<G, P, H>>,
        store: CredentialStore,
        committer: NetworkCommitter<N>,
        config: EngineConfig,
    ) -> Self {
        let advertiser = BluetoothAdvertiser::new(radio, config.device_name.clone());
        let backoff = Backoff::new(config.backoff_base, config.backoff_cap);
        Self {
            advertiser,
            strategies,
            store,
            committer,
            config,
            state: EngineState::Idle,
            queue: VecDeque::new(),
            backoff,
            provisioned: false,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    /// Allow extraction again after a successful provisioning, e.g. for an
    /// operator-requested re-provisioning.
    pub fn reset(&mut self) {
        self.provisioned = false;
        self.backoff.reset();
        self.state = EngineState::Advertising;
    }

    /// Run the engine until the radio fails. Never returns on the success
    /// path: after provisioning it keeps servicing Bluetooth events so a
    /// reset can re-enter the flow.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        if self.config.resume_stored {
            self.try_stored().await;
        }

        // RadioUnavailable here is fatal and reaches the operator; the
        // engine never enters Advertising.
        self.advertiser.start().await?;
        self.state = EngineState::Advertising;

        loop {
            if let Err(e) = self.step().await {
                self.advertiser.stop().await;
                return Err(e);
            }
        }
    }

    /// One iteration of the run loop: process a queued peer if any, else
    /// wait for the next Bluetooth event.
    async fn step(&mut self) -> Result<(), EngineError> {
        if !self.provisioned {
            if let Some(peer) = self.queue.pop_front() {
                match self.process_peer(peer).await {
                    PeerOutcome::Succeeded => {
                        self.provisioned = true;
                        self.backoff.reset();
                    }
                    PeerOutcome::Exhausted => {
                        // Close the pairing window for the backoff period so
                        // an uncooperative peer cannot hot-loop the engine.
                        let delay = self.backoff.next();
                        info!("all strategies exhausted, re-advertising in {delay:?}");
                        self.advertiser.set_discoverable(false).await?;
                        tokio::time::sleep(delay).await;
                        self.advertiser.set_discoverable(true).await?;
                        self.state = EngineState::Advertising;
                    }
                    PeerOutcome::Abandoned => {
                        self.state = EngineState::Advertising;
                    }
                }
                return Ok(());
            }
        }

        match self.advertiser.next_event().await? {
            BleEvent::PeerConnected { address } => {
                if self.provisioned {
                    debug!("ignoring connection from {address}: already provisioned");
                } else {
                    info!("phone connected: {address}");
                    self.enqueue_peer(PeerSession::new(address));
                }
            }
            BleEvent::PeerDisconnected { address } => {
                debug!("phone disconnected: {address}");
                // Drop peers that left before their turn came up
                self.queue.retain(|p| p.peer != address);
            }
        }
        Ok(())
    }

    pub fn enqueue_peer(&mut self, peer: PeerSession) {
        self.queue.push_back(peer);
    }

    /// Process every queued peer to a terminal outcome, in FIFO order.
    /// Stops early once provisioned. Exposed for tests and for embedding
    /// the engine without the event loop.
    pub async fn process_queued(&mut self) -> Vec<(String, PeerOutcome)> {
        let mut outcomes = Vec::new();
        while let Some(peer) = self.queue.pop_front() {
            if self.provisioned {
                break;
            }
            let address = peer.peer.clone();
            let outcome = self.process_peer(peer).await;
            if outcome == PeerOutcome::Succeeded {
                self.provisioned = true;
            }
            outcomes.push((address, outcome));
        }
        outcomes
    }

    /// Walk one peer through the strategy list.
    async fn process_peer(&mut self, mut peer: PeerSession) -> PeerOutcome {
        info!("provisioning session started for {}", peer.peer);
        peer.state = SessionState::ExtractionInProgress;

        for index in 0..self.strategies.len() {
            self.state = EngineState::ExtractingViaStrategy(index);
            let kind = self.strategies[index].kind();
            let mut attempt = StrategyAttempt::new(kind, &peer, 1);

            loop {
                debug!(
                    "strategy {kind} attempt {} for {}",
                    attempt.attempt_number, peer.peer
                );
                let outcome = self.strategies[index]
                    .attempt(&peer, self.config.attempt_timeout)
                    .await;
                attempt.outcome = outcome.clone();

                match outcome {
                    AttemptOutcome::Success(payload) => {
                        self.state = EngineState::Validating;
                        let record = match CredentialRecord::from_payload(payload, kind) {
                            Ok(record) => record,
                            Err(e) => {
                                // Malformed payload that slipped past the
                                // strategy-level checks; same treatment as
                                // a Rejected outcome.
                                warn!("payload from {} failed validation: {e}", peer.peer);
                                break;
                            }
                        };
                        if self.commit_record(&record).await {
                            info!("provisioned via {kind}: joined {:?}", record.ssid);
                            peer.state = SessionState::Extracted;
                            self.state = EngineState::Succeeded;
                            return PeerOutcome::Succeeded;
                        }
                        if attempt.attempt_number < self.config.max_retries {
                            self.state = EngineState::Retrying;
                            attempt.attempt_number += 1;
                            continue;
                        }
                        warn!("strategy {kind} exhausted its {} commit attempts", self.config.max_retries);
                        break;
                    }
                    AttemptOutcome::Timeout => {
                        info!("strategy {kind} timed out for {}", peer.peer);
                        break;
                    }
                    AttemptOutcome::Rejected(reason) => {
                        info!("strategy {kind} rejected for {}: {reason}", peer.peer);
                        break;
                    }
                    AttemptOutcome::Error(reason) => {
                        error!("strategy {kind} failed for {}: {reason}", peer.peer);
                        peer.state = SessionState::Failed;
                        return PeerOutcome::Abandoned;
                    }
                    AttemptOutcome::Pending => {
                        // attempt() always resolves; treat a stray Pending
                        // like a fault.
                        error!("strategy {kind} returned an unresolved attempt");
                        peer.state = SessionState::Failed;
                        return PeerOutcome::Abandoned;
                    }
                }
            }
        }

        warn!("no strategy obtained working credentials from {}", peer.peer);
        peer.state = SessionState::Failed;
        self.state = EngineState::Exhausted;
        PeerOutcome::Exhausted
    }

    /// Persist and commit a validated record. True when the device ended up
    /// connected.
    async fn commit_record(&mut self, record: &CredentialRecord) -> bool {
        self.state = EngineState::Committing;
        if let Err(e) = self.store.save(record) {
            // The record is still usable for this boot; losing the cached
            // copy only costs the resume shortcut.
            error!("failed to persist credentials: {e}");
        }

        match self.committer.commit(record).await {
            Ok(result) => {
                self.state = EngineState::Verifying;
                if result.connected {
                    if let Some(ip) = &result.assigned_address {
                        info!("connected to {:?}, address {ip}", record.ssid);
                    }
                } else {
                    info!("committed {:?} but no connectivity", record.ssid);
                }
                result.connected
            }
            Err(CommitError::Rejected(reason)) => {
                warn!("network stack rejected {:?}: {reason}", record.ssid);
                false
            }
        }
    }

    /// Startup shortcut: if a valid record is already stored, commit it
    /// before opening a pairing window at all.
    async fn try_stored(&mut self) {
        let Some(record) = self.store.load() else {
            return;
        };
        info!("found stored credentials for {:?}, trying them first", record.ssid);
        if self.commit_record(&record).await {
            info!("stored credentials still work, not advertising for new ones");
            self.provisioned = true;
            self.state = EngineState::Succeeded;
        } else {
            warn!("stored credentials no longer work, falling back to provisioning");
        }
    }
}
