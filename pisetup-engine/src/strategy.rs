//! Extraction strategies - one protocol each, one shared attempt contract
//!
//! Every variant obtains one raw credential payload from a connected phone.
//! Attempts are self-contained: each one acquires its radio/service state
//! at the start and tears it down before returning, whatever the outcome,
//! so a retry never observes duplicate GATT services, stale P2P groups or
//! orphaned hotspot processes.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use pisetup_proto::CredentialPayload;

use crate::credential::StrategyKind;
use crate::radio::{GattHost, HotspotControl, Negotiation, P2pControl};
use crate::session::{AttemptOutcome, PeerSession};

/// How often WiFi Direct discovery results are polled
const P2P_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Hosts the writable credentials characteristic and waits for the phone to
/// write one framed payload.
pub struct GattWrite<G: GattHost> {
    host: G,
}

impl<G: GattHost> GattWrite<G> {
    pub fn new(host: G) -> Self {
        Self { host }
    }

    pub async fn attempt(&mut self, peer: &PeerSession, timeout: Duration) -> AttemptOutcome {
        if let Err(e) = self.host.register().await {
            return AttemptOutcome::Error(format!("failed to register GATT service: {e}"));
        }
        debug!("gatt: credentials characteristic published for {}", peer.peer);

        let outcome = match tokio::time::timeout(timeout, self.host.next_write()).await {
            Err(_) => AttemptOutcome::Timeout,
            Ok(Err(e)) => AttemptOutcome::Error(format!("GATT write wait failed: {e}")),
            // A malformed write is an expected buggy/adversarial-peer case,
            // not an engine fault.
            Ok(Ok(bytes)) => match CredentialPayload::from_frame(&bytes) {
                Ok(payload) => AttemptOutcome::Success(payload),
                Err(e) => AttemptOutcome::Rejected(format!("malformed GATT write: {e}")),
            },
        };

        // Teardown must complete before the outcome is returned
        if let Err(e) = self.host.unregister().await {
            warn!("gatt: failed to unregister service: {e}");
        }
        outcome
    }
}

/// Drives P2P discovery, negotiates a group with the peer and reads the
/// network info the peer shares on formation.
pub struct WifiDirectHandshake<P: P2pControl> {
    p2p: P,
}

impl<P: P2pControl> WifiDirectHandshake<P> {
    pub fn new(p2p: P) -> Self {
        Self { p2p }
    }

    pub async fn attempt(&mut self, peer: &PeerSession, timeout: Duration) -> AttemptOutcome {
        if let Err(e) = self.p2p.start_find().await {
            return AttemptOutcome::Error(format!("failed to start P2P discovery: {e}"));
        }

        let outcome = self.negotiate(peer, timeout).await;

        if let Err(e) = self.p2p.remove_group().await {
            warn!("p2p: failed to remove group: {e}");
        }
        if let Err(e) = self.p2p.stop_find().await {
            warn!("p2p: failed to stop discovery: {e}");
        }
        outcome
    }

    async fn negotiate(&mut self, peer: &PeerSession, timeout: Duration) -> AttemptOutcome {
        let deadline = Instant::now() + timeout;

        // Discovery: wait for the phone to show up as a P2P peer. The
        // session's Bluetooth address rarely matches the P2P device
        // address, so any discovered peer is accepted once the session
        // peer itself is not listed.
        let address = loop {
            let peers = match self.p2p.peers().await {
                Ok(p) => p,
                Err(e) => return AttemptOutcome::Error(format!("P2P peer enumeration failed: {e}")),
            };
            if let Some(addr) = peers
                .iter()
                .find(|a| a.eq_ignore_ascii_case(&peer.peer))
                .or_else(|| peers.first())
            {
                break addr.clone();
            }
            if Instant::now() + P2P_POLL_INTERVAL >= deadline {
                return AttemptOutcome::Timeout;
            }
            tokio::time::sleep(P2P_POLL_INTERVAL).await;
        };

        debug!("p2p: negotiating group with {address}");
        match self.p2p.connect(&address).await {
            Err(e) => return AttemptOutcome::Error(format!("P2P negotiation failed: {e}")),
            Ok(Negotiation::Refused) => {
                return AttemptOutcome::Rejected(format!("peer {address} refused negotiation"));
            }
            Ok(Negotiation::Formed) => {}
        }

        match self.p2p.group_info().await {
            Err(e) => AttemptOutcome::Error(format!("failed to read group info: {e}")),
            Ok(None) => AttemptOutcome::Rejected(format!("peer {address} shared no network info")),
            Ok(Some(info)) => {
                AttemptOutcome::Success(CredentialPayload::new(&info.ssid, info.passphrase.as_deref()))
            }
        }
    }
}

/// Stands up a temporary access point with a fixed SSID/passphrase plus a
/// capture listener, and waits for an associated client to submit
/// credentials.
pub struct HotspotShare<H: HotspotControl> {
    hotspot: H,
    ap_ssid: String,
    ap_passphrase: String,
}

impl<H: HotspotControl> HotspotShare<H> {
    pub fn new(hotspot: H, ap_ssid: impl Into<String>, ap_passphrase: impl Into<String>) -> Self {
        Self {
            hotspot,
            ap_ssid: ap_ssid.into(),
            ap_passphrase: ap_passphrase.into(),
        }
    }

    pub async fn attempt(&mut self, peer: &PeerSession, timeout: Duration) -> AttemptOutcome {
        if let Err(e) = self.hotspot.start(&self.ap_ssid, &self.ap_passphrase).await {
            return AttemptOutcome::Error(format!("failed to start hotspot: {e}"));
        }
        info!(
            "hotspot: access point {:?} up, waiting for a submission from {}",
            self.ap_ssid, peer.peer
        );

        // A client that associates but never submits simply times out here.
        let outcome = match tokio::time::timeout(timeout, self.hotspot.next_submission()).await {
            Err(_) => AttemptOutcome::Timeout,
            Ok(Err(e)) => AttemptOutcome::Error(format!("capture listener failed: {e}")),
            Ok(Ok(bytes)) => match CredentialPayload::from_json(&bytes) {
                Ok(payload) => AttemptOutcome::Success(payload),
                Err(e) => AttemptOutcome::Rejected(format!("malformed submission: {e}")),
            },
        };

        if let Err(e) = self.hotspot.stop().await {
            warn!("hotspot: failed to stop access point: {e}");
        }
        outcome
    }
}

/// The configured strategy set, in priority order. A tagged union rather
/// than trait objects keeps the orchestrator's advancement logic uniform
/// and the variants independently testable.
pub enum Strategy<G: GattHost, P: P2pControl, H: HotspotControl> {
    Gatt(GattWrite<G>),
    WifiDirect(WifiDirectHandshake<P>),
    Hotspot(HotspotShare<H>),
}

impl<G: GattHost, P: P2pControl, H: HotspotControl> Strategy<G, P, H> {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Gatt(_) => StrategyKind::GattWrite,
            Strategy::WifiDirect(_) => StrategyKind::WifiDirectHandshake,
            Strategy::Hotspot(_) => StrategyKind::HotspotShare,
        }
    }

    pub async fn attempt(&mut self, peer: &PeerSession, timeout: Duration) -> AttemptOutcome {
        match self {
            Strategy::Gatt(s) => s.attempt(peer, timeout).await,
            Strategy::WifiDirect(s) => s.attempt(peer, timeout).await,
            Strategy::Hotspot(s) => s.attempt(peer, timeout).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::radio::GroupInfo;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn session() -> PeerSession {
        PeerSession::new("AA:BB:CC:DD:EE:FF")
    }

    /// GATT host whose scripted writes run out into an everlasting wait
    pub(crate) struct MockGatt {
        pub writes: VecDeque<Vec<u8>>,
        pub registered: bool,
        pub registrations: Arc<AtomicU32>,
        pub unregistrations: Arc<AtomicU32>,
    }

    impl MockGatt {
        pub fn new(writes: Vec<Vec<u8>>) -> Self {
            Self {
                writes: writes.into(),
                registered: false,
                registrations: Arc::new(AtomicU32::new(0)),
                unregistrations: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl GattHost for MockGatt {
        type Error = String;

        async fn register(&mut self) -> Result<(), String> {
            assert!(!self.registered, "duplicate GATT service registration");
            self.registered = true;
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unregister(&mut self) -> Result<(), String> {
            assert!(self.registered, "unregister without register");
            self.registered = false;
            self.unregistrations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next_write(&mut self) -> Result<Vec<u8>, String> {
            match self.writes.pop_front() {
                Some(w) => Ok(w),
                None => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    pub(crate) struct MockP2p {
        pub discovered: Vec<String>,
        pub negotiation: Negotiation,
        pub info: Option<GroupInfo>,
        pub finding: bool,
        pub group_removals: Arc<AtomicU32>,
    }

    impl MockP2p {
        pub fn new(discovered: Vec<String>, negotiation: Negotiation, info: Option<GroupInfo>) -> Self {
            Self {
                discovered,
                negotiation,
                info,
                finding: false,
                group_removals: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl P2pControl for MockP2p {
        type Error = String;

        async fn start_find(&mut self) -> Result<(), String> {
            assert!(!self.finding, "discovery started twice");
            self.finding = true;
            Ok(())
        }

        async fn stop_find(&mut self) -> Result<(), String> {
            self.finding = false;
            Ok(())
        }

        async fn peers(&mut self) -> Result<Vec<String>, String> {
            Ok(self.discovered.clone())
        }

        async fn connect(&mut self, _address: &str) -> Result<Negotiation, String> {
            Ok(self.negotiation)
        }

        async fn group_info(&mut self) -> Result<Option<GroupInfo>, String> {
            Ok(self.info.clone())
        }

        async fn remove_group(&mut self) -> Result<(), String> {
            self.group_removals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) struct MockHotspot {
        pub submissions: VecDeque<Vec<u8>>,
        pub running: bool,
        pub starts: Arc<AtomicU32>,
        pub stops: Arc<AtomicU32>,
    }

    impl MockHotspot {
        pub fn new(submissions: Vec<Vec<u8>>) -> Self {
            Self {
                submissions: submissions.into(),
                running: false,
                starts: Arc::new(AtomicU32::new(0)),
                stops: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl HotspotControl for MockHotspot {
        type Error = String;

        async fn start(&mut self, _ssid: &str, _passphrase: &str) -> Result<(), String> {
            assert!(!self.running, "hotspot started while already running");
            self.running = true;
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), String> {
            assert!(self.running, "hotspot stopped while not running");
            self.running = false;
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn next_submission(&mut self) -> Result<Vec<u8>, String> {
            match self.submissions.pop_front() {
                Some(s) => Ok(s),
                None => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gatt_valid_write_succeeds_and_tears_down() {
        let mut s = GattWrite::new(MockGatt::new(vec![b"HomeNet\0sup3rsecret".to_vec()]));
        let outcome = s.attempt(&session(), TIMEOUT).await;
        assert_eq!(
            outcome,
            AttemptOutcome::Success(CredentialPayload::new("HomeNet", Some("sup3rsecret")))
        );
        assert!(!s.host.registered);
    }

    #[tokio::test(start_paused = true)]
    async fn gatt_malformed_write_is_rejected() {
        let mut s = GattWrite::new(MockGatt::new(vec![b"no-separator".to_vec()]));
        assert!(matches!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Rejected(_)));
        assert!(!s.host.registered);
    }

    #[tokio::test(start_paused = true)]
    async fn gatt_times_out_and_retry_starts_clean() {
        let mut s = GattWrite::new(MockGatt::new(vec![]));
        let registrations = s.host.registrations.clone();
        let unregistrations = s.host.unregistrations.clone();

        // Two attempts; MockGatt asserts there is never a duplicate
        // registration, so teardown must have completed in between.
        assert_eq!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Timeout);
        assert_eq!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Timeout);

        assert_eq!(registrations.load(Ordering::SeqCst), 2);
        assert_eq!(unregistrations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn p2p_formed_group_yields_shared_network() {
        let info = GroupInfo { ssid: "HomeNet".to_string(), passphrase: Some("sup3rsecret".to_string()) };
        let mut s = WifiDirectHandshake::new(MockP2p::new(
            vec!["aa:bb:cc:dd:ee:ff".to_string()],
            Negotiation::Formed,
            Some(info),
        ));
        let outcome = s.attempt(&session(), TIMEOUT).await;
        assert_eq!(
            outcome,
            AttemptOutcome::Success(CredentialPayload::new("HomeNet", Some("sup3rsecret")))
        );
        assert!(!s.p2p.finding);
        assert_eq!(s.p2p.group_removals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn p2p_refusal_is_rejected() {
        let mut s = WifiDirectHandshake::new(MockP2p::new(
            vec!["11:22:33:44:55:66".to_string()],
            Negotiation::Refused,
            None,
        ));
        assert!(matches!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Rejected(_)));
        assert!(!s.p2p.finding);
    }

    #[tokio::test(start_paused = true)]
    async fn p2p_no_peers_times_out_clean() {
        let mut s = WifiDirectHandshake::new(MockP2p::new(vec![], Negotiation::Formed, None));
        assert_eq!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Timeout);
        assert!(!s.p2p.finding);
        // Retry must not trip the discovery-started-twice assertion
        assert_eq!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn p2p_group_without_network_info_is_rejected() {
        let mut s = WifiDirectHandshake::new(MockP2p::new(
            vec!["11:22:33:44:55:66".to_string()],
            Negotiation::Formed,
            None,
        ));
        assert!(matches!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Rejected(_)));
        assert_eq!(s.p2p.group_removals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hotspot_json_submission_succeeds() {
        let body = br#"{"ssid":"GuestNet","passphrase":"","security":"open"}"#.to_vec();
        let mut s = HotspotShare::new(MockHotspot::new(vec![body]), "PiWiFiSetup", "wifisetup123");
        let outcome = s.attempt(&session(), TIMEOUT).await;
        assert_eq!(outcome, AttemptOutcome::Success(CredentialPayload::new("GuestNet", None)));
        assert!(!s.hotspot.running);
    }

    #[tokio::test(start_paused = true)]
    async fn hotspot_association_without_submission_times_out() {
        let mut s = HotspotShare::new(MockHotspot::new(vec![]), "PiWiFiSetup", "wifisetup123");
        let stops = s.hotspot.stops.clone();
        assert_eq!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Timeout);
        // AP torn down before Timeout was returned
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        // And a retry stands up a fresh one
        assert_eq!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Timeout);
        assert_eq!(s.hotspot.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hotspot_garbage_submission_is_rejected() {
        let mut s = HotspotShare::new(
            MockHotspot::new(vec![b"not json".to_vec()]),
            "PiWiFiSetup",
            "wifisetup123",
        );
        assert!(matches!(s.attempt(&session(), TIMEOUT).await, AttemptOutcome::Rejected(_)));
        assert!(!s.hotspot.running);
    }
}
