//! Validated credential records

use serde::{Deserialize, Serialize};

use pisetup_proto::{CredentialPayload, PayloadError, SecurityType};

use crate::session::current_timestamp;

/// Which extraction protocol produced a credential payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    GattWrite,
    WifiDirectHandshake,
    HotspotShare,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::GattWrite => "gatt",
            StrategyKind::WifiDirectHandshake => "p2p",
            StrategyKind::HotspotShare => "hotspot",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gatt" => Ok(StrategyKind::GattWrite),
            "p2p" | "wifi-direct" => Ok(StrategyKind::WifiDirectHandshake),
            "hotspot" => Ok(StrategyKind::HotspotShare),
            other => Err(format!("unknown strategy: {other} (expected gatt, p2p or hotspot)")),
        }
    }
}

/// A validated WiFi credential record. Immutable once constructed; the only
/// way to build one is [`CredentialRecord::from_payload`], so a record
/// always satisfies the structural bounds (non-empty SSID, passphrase
/// length, passphrase present for secured networks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub ssid: String,
    /// None for open networks
    pub passphrase: Option<String>,
    pub security: SecurityType,
    pub source: StrategyKind,
    pub acquired_at: u64,
}

impl CredentialRecord {
    pub fn from_payload(payload: CredentialPayload, source: StrategyKind) -> Result<Self, PayloadError> {
        payload.validate()?;
        // A passphrase on a declared-open network is peer noise; the record
        // keeps the declared security and drops the passphrase so the
        // commit path never has to reconcile the two.
        let passphrase = match payload.security {
            SecurityType::Open => None,
            SecurityType::WpaPsk => payload.passphrase,
        };
        Ok(Self {
            ssid: payload.ssid,
            passphrase,
            security: payload.security,
            source,
            acquired_at: current_timestamp(),
        })
    }

    /// The payload view of this record, used to re-validate on load.
    pub(crate) fn as_payload(&self) -> CredentialPayload {
        CredentialPayload {
            ssid: self.ssid.clone(),
            passphrase: self.passphrase.clone(),
            security: self.security,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_requires_valid_payload() {
        let ok = CredentialPayload::new("HomeNet", Some("sup3rsecret"));
        let record = CredentialRecord::from_payload(ok, StrategyKind::GattWrite).unwrap();
        assert_eq!(record.ssid, "HomeNet");
        assert_eq!(record.security, SecurityType::WpaPsk);
        assert_eq!(record.source, StrategyKind::GattWrite);

        let bad = CredentialPayload::new("HomeNet", Some("short"));
        assert!(CredentialRecord::from_payload(bad, StrategyKind::GattWrite).is_err());

        let empty_ssid = CredentialPayload::new("", None);
        assert!(CredentialRecord::from_payload(empty_ssid, StrategyKind::HotspotShare).is_err());
    }

    #[test]
    fn open_network_record() {
        let open = CredentialPayload::new("GuestNet", None);
        let record = CredentialRecord::from_payload(open, StrategyKind::HotspotShare).unwrap();
        assert_eq!(record.passphrase, None);
        assert_eq!(record.security, SecurityType::Open);
    }

    #[test]
    fn open_record_drops_a_declared_passphrase() {
        let p = CredentialPayload::from_frame(b"CoffeeShop\0abcdefgh\0open").unwrap();
        let record = CredentialRecord::from_payload(p, StrategyKind::GattWrite).unwrap();
        assert_eq!(record.security, SecurityType::Open);
        assert_eq!(record.passphrase, None);
    }

    #[test]
    fn strategy_kind_parsing() {
        assert_eq!("gatt".parse::<StrategyKind>().unwrap(), StrategyKind::GattWrite);
        assert_eq!("p2p".parse::<StrategyKind>().unwrap(), StrategyKind::WifiDirectHandshake);
        assert_eq!("hotspot".parse::<StrategyKind>().unwrap(), StrategyKind::HotspotShare);
        assert!("wps".parse::<StrategyKind>().is_err());
    }
}
