//! pisetup wire protocol - credential payload framing and BLE constants
//!
//! A phone hands the device one credential payload over whichever transport
//! it can reach: a GATT characteristic write (NUL-separated frame), a WiFi
//! Direct group negotiation (field pair from the group info), or an HTTP
//! POST against the capture hotspot (JSON body). This crate defines the
//! payload type, both codecs, and the structural validation bounds shared
//! by every transport.

pub mod ble;

use serde::{Deserialize, Serialize};

/// Maximum SSID length in bytes (802.11).
pub const MAX_SSID_LEN: usize = 32;

/// WPA passphrase length bounds in bytes (802.11i).
pub const MIN_PASSPHRASE_LEN: usize = 8;
pub const MAX_PASSPHRASE_LEN: usize = 63;

/// Security type of the target network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityType {
    /// Open network, no passphrase
    Open,
    /// WPA/WPA2 personal
    WpaPsk,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("frame is not valid UTF-8")]
    NotUtf8,
    #[error("frame has {0} fields, expected 2 or 3")]
    BadFieldCount(usize),
    #[error("unknown security type: {0}")]
    UnknownSecurity(String),
    #[error("invalid JSON payload: {0}")]
    BadJson(String),
    #[error("ssid is empty")]
    EmptySsid,
    #[error("ssid is {0} bytes, maximum is {MAX_SSID_LEN}")]
    SsidTooLong(usize),
    #[error("passphrase is {0} bytes, must be {MIN_PASSPHRASE_LEN}-{MAX_PASSPHRASE_LEN}")]
    BadPassphraseLen(usize),
    #[error("secured network requires a passphrase")]
    MissingPassphrase,
}

/// Raw credential payload as received from a peer, before it becomes a
/// validated record on the device side.
///
/// GATT frame encoding: `SSID \x00 PASSPHRASE [\x00 SECURITY]`. An empty
/// passphrase field means an open network. The optional third field is
/// `open` or `wpa-psk`; when absent, security is inferred from the
/// passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub ssid: String,
    /// None for open networks
    #[serde(default, deserialize_with = "empty_as_none")]
    pub passphrase: Option<String>,
    #[serde(default = "default_security")]
    pub security: SecurityType,
}

fn default_security() -> SecurityType {
    SecurityType::WpaPsk
}

/// Phones posting to the capture endpoint tend to send `"passphrase": ""`
/// for open networks rather than omitting the field.
fn empty_as_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Option::<String>::deserialize(de)?;
    Ok(v.filter(|s| !s.is_empty()))
}

impl CredentialPayload {
    pub fn new(ssid: &str, passphrase: Option<&str>) -> Self {
        let passphrase = passphrase.filter(|p| !p.is_empty()).map(str::to_string);
        let security = if passphrase.is_some() {
            SecurityType::WpaPsk
        } else {
            SecurityType::Open
        };
        Self { ssid: ssid.to_string(), passphrase, security }
    }

    /// Parse a GATT characteristic write.
    pub fn from_frame(data: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(data).map_err(|_| PayloadError::NotUtf8)?;
        let fields: Vec<&str> = text.split('\0').collect();

        let (ssid, passphrase, security) = match fields.as_slice() {
            [ssid, pass] => (*ssid, *pass, None),
            [ssid, pass, sec] => (*ssid, *pass, Some(*sec)),
            other => return Err(PayloadError::BadFieldCount(other.len())),
        };

        let security = match security {
            None => {
                if passphrase.is_empty() {
                    SecurityType::Open
                } else {
                    SecurityType::WpaPsk
                }
            }
            Some("open") => SecurityType::Open,
            Some("wpa-psk") => SecurityType::WpaPsk,
            Some(other) => return Err(PayloadError::UnknownSecurity(other.to_string())),
        };

        Ok(Self {
            ssid: ssid.to_string(),
            passphrase: if passphrase.is_empty() { None } else { Some(passphrase.to_string()) },
            security,
        })
    }

    /// Encode as a GATT characteristic write. Used by controller tools.
    pub fn to_frame(&self) -> Vec<u8> {
        let sec = match self.security {
            SecurityType::Open => "open",
            SecurityType::WpaPsk => "wpa-psk",
        };
        let pass = self.passphrase.as_deref().unwrap_or("");
        format!("{}\0{}\0{}", self.ssid, pass, sec).into_bytes()
    }

    /// Parse a JSON body submitted to the hotspot capture endpoint.
    pub fn from_json(data: &[u8]) -> Result<Self, PayloadError> {
        serde_json::from_slice(data).map_err(|e| PayloadError::BadJson(e.to_string()))
    }

    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("payload serialization cannot fail")
    }

    /// Structural validation. Every transport runs this before the payload
    /// is allowed to become a credential record.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.ssid.is_empty() {
            return Err(PayloadError::EmptySsid);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(PayloadError::SsidTooLong(self.ssid.len()));
        }
        // Length bounds hold whenever a passphrase is present, whatever
        // security the peer declared.
        if let Some(p) = &self.passphrase {
            if p.len() < MIN_PASSPHRASE_LEN || p.len() > MAX_PASSPHRASE_LEN {
                return Err(PayloadError::BadPassphraseLen(p.len()));
            }
        }
        match (&self.security, &self.passphrase) {
            (SecurityType::WpaPsk, None) => Err(PayloadError::MissingPassphrase),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_two_fields() {
        let p = CredentialPayload::from_frame(b"HomeNet\0sup3rsecret").unwrap();
        assert_eq!(p.ssid, "HomeNet");
        assert_eq!(p.passphrase.as_deref(), Some("sup3rsecret"));
        assert_eq!(p.security, SecurityType::WpaPsk);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn frame_open_network() {
        let p = CredentialPayload::from_frame(b"GuestNet\0\0open").unwrap();
        assert_eq!(p.ssid, "GuestNet");
        assert_eq!(p.passphrase, None);
        assert_eq!(p.security, SecurityType::Open);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn frame_empty_pass_without_security_is_open() {
        let p = CredentialPayload::from_frame(b"GuestNet\0").unwrap();
        assert_eq!(p.security, SecurityType::Open);
    }

    #[test]
    fn frame_rejects_garbage() {
        assert_eq!(
            CredentialPayload::from_frame(b"no-separator"),
            Err(PayloadError::BadFieldCount(1))
        );
        assert_eq!(
            CredentialPayload::from_frame(b"a\0b\0c\0d"),
            Err(PayloadError::BadFieldCount(4))
        );
        assert!(matches!(
            CredentialPayload::from_frame(&[0xff, 0xfe, 0x00, 0x41]),
            Err(PayloadError::NotUtf8)
        ));
        assert_eq!(
            CredentialPayload::from_frame(b"Net\0pass\0wep"),
            Err(PayloadError::UnknownSecurity("wep".to_string()))
        );
    }

    #[test]
    fn frame_round_trip() {
        let p = CredentialPayload::new("HomeNet", Some("sup3rsecret"));
        assert_eq!(CredentialPayload::from_frame(&p.to_frame()).unwrap(), p);
    }

    #[test]
    fn json_open_network_with_empty_passphrase() {
        let p =
            CredentialPayload::from_json(br#"{"ssid":"GuestNet","passphrase":"","security":"open"}"#)
                .unwrap();
        assert_eq!(p.ssid, "GuestNet");
        assert_eq!(p.passphrase, None);
        assert_eq!(p.security, SecurityType::Open);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn json_defaults_to_wpa() {
        let p = CredentialPayload::from_json(br#"{"ssid":"HomeNet","passphrase":"hunter2hunter2"}"#)
            .unwrap();
        assert_eq!(p.security, SecurityType::WpaPsk);
    }

    #[test]
    fn json_rejects_malformed() {
        assert!(matches!(
            CredentialPayload::from_json(b"not json"),
            Err(PayloadError::BadJson(_))
        ));
    }

    #[test]
    fn validate_bounds() {
        assert_eq!(
            CredentialPayload::new("", Some("longenough")).validate(),
            Err(PayloadError::EmptySsid)
        );
        assert_eq!(
            CredentialPayload::new(&"x".repeat(33), Some("longenough")).validate(),
            Err(PayloadError::SsidTooLong(33))
        );
        assert_eq!(
            CredentialPayload::new("Net", Some("short")).validate(),
            Err(PayloadError::BadPassphraseLen(5))
        );
        assert_eq!(
            CredentialPayload::new("Net", Some(&"p".repeat(64))).validate(),
            Err(PayloadError::BadPassphraseLen(64))
        );
        assert!(CredentialPayload::new("Net", Some(&"p".repeat(63))).validate().is_ok());

        // Declaring the network open does not lift the passphrase bounds
        let open_with_short_pass = CredentialPayload::from_frame(b"Net\0abc\0open").unwrap();
        assert_eq!(open_with_short_pass.validate(), Err(PayloadError::BadPassphraseLen(3)));

        let secured_without_pass = CredentialPayload {
            ssid: "Net".to_string(),
            passphrase: None,
            security: SecurityType::WpaPsk,
        };
        assert_eq!(secured_without_pass.validate(), Err(PayloadError::MissingPassphrase));
    }
}
