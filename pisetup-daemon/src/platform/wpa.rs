//! wpa_supplicant access via one-shot `wpa_cli` invocations
//!
//! One type covers both roles wpa_supplicant plays here: the WiFi Direct
//! control interface (peer discovery, group negotiation) and the station
//! network stack (profile write, association, status). Every call is a
//! fresh `wpa_cli -i <iface>` invocation, so there is no session state to
//! leak between strategy attempts.

use std::time::Duration;

use log::debug;
use tokio::process::Command;

use pisetup_engine::SecurityType;
use pisetup_engine::radio::{GroupInfo, LinkStatus, Negotiation, NetworkStack, P2pControl};

/// How long group formation is given after a PBC connect
const GROUP_FORMATION_WINDOW: Duration = Duration::from_secs(10);
const GROUP_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum WpaError {
    #[error("wpa_cli: {0}")]
    Io(#[from] std::io::Error),
    #[error("wpa_cli {0} failed")]
    Failed(String),
}

#[derive(Clone)]
pub struct WpaCli {
    iface: String,
}

impl WpaCli {
    pub fn new(iface: impl Into<String>) -> Self {
        Self { iface: iface.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String, WpaError> {
        let output = Command::new("wpa_cli")
            .arg("-i")
            .arg(&self.iface)
            .args(args)
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("wpa_cli {}: {stdout}", args.join(" "));
        if !output.status.success() || stdout == "FAIL" {
            return Err(WpaError::Failed(args.join(" ")));
        }
        Ok(stdout)
    }

    async fn status_fields(&self) -> Result<String, WpaError> {
        self.run(&["status"]).await
    }
}

impl P2pControl for WpaCli {
    type Error = WpaError;

    async fn start_find(&mut self) -> Result<(), WpaError> {
        self.run(&["p2p_find"]).await.map(drop)
    }

    async fn stop_find(&mut self) -> Result<(), WpaError> {
        self.run(&["p2p_stop_find"]).await.map(drop)
    }

    async fn peers(&mut self) -> Result<Vec<String>, WpaError> {
        let out = self.run(&["p2p_peers"]).await?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    async fn connect(&mut self, address: &str) -> Result<Negotiation, WpaError> {
        // A FAIL from p2p_connect is the peer (or supplicant) declining the
        // negotiation, not a collaborator fault.
        match self.run(&["p2p_connect", address, "pbc"]).await {
            Err(WpaError::Failed(_)) => return Ok(Negotiation::Refused),
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        // PBC needs the peer to confirm; poll for the group
        let mut waited = Duration::ZERO;
        while waited < GROUP_FORMATION_WINDOW {
            let status = self.status_fields().await?;
            if status.contains("p2p_go_mode=1") || status.contains("p2p_client_mode=1") {
                return Ok(Negotiation::Formed);
            }
            tokio::time::sleep(GROUP_POLL_INTERVAL).await;
            waited += GROUP_POLL_INTERVAL;
        }
        Ok(Negotiation::Refused)
    }

    async fn group_info(&mut self) -> Result<Option<GroupInfo>, WpaError> {
        let status = self.status_fields().await?;
        let Some(ssid) = parse_field(&status, "ssid") else {
            return Ok(None);
        };
        // Only present when we are the group owner; a FAIL just means the
        // peer's network is protected by its own credentials.
        let passphrase = self.run(&["p2p_get_passphrase"]).await.ok();
        Ok(Some(GroupInfo { ssid, passphrase }))
    }

    async fn remove_group(&mut self) -> Result<(), WpaError> {
        // FAIL means there is no group, which is fine
        match self.run(&["p2p_group_remove", "*"]).await {
            Ok(_) | Err(WpaError::Failed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl NetworkStack for WpaCli {
    type Error = WpaError;

    async fn apply_profile(
        &mut self,
        ssid: &str,
        passphrase: Option<&str>,
        security: SecurityType,
    ) -> Result<(), WpaError> {
        let id = self.run(&["add_network"]).await?;
        let id = id.trim();

        let result = async {
            self.run(&["set_network", id, "ssid", &quoted(ssid)]).await?;
            match (security, passphrase) {
                (SecurityType::WpaPsk, Some(pass)) => {
                    self.run(&["set_network", id, "psk", &quoted(pass)]).await?;
                }
                (SecurityType::WpaPsk, None) => {
                    return Err(WpaError::Failed("set_network psk".to_string()));
                }
                (SecurityType::Open, _) => {
                    self.run(&["set_network", id, "key_mgmt", "NONE"]).await?;
                }
            }
            self.run(&["select_network", id]).await?;
            if let Err(e) = self.run(&["save_config"]).await {
                // update_config=0 in wpa_supplicant.conf; the profile still
                // applies for this boot
                debug!("save_config failed: {e}");
            }
            Ok(())
        }
        .await;

        if result.is_err() {
            // Do not leave a half-configured network behind
            let _ = self.run(&["remove_network", id]).await;
        }
        result
    }

    async fn link_status(&mut self) -> Result<LinkStatus, WpaError> {
        let status = self.status_fields().await?;
        Ok(parse_link_status(&status))
    }
}

fn quoted(s: &str) -> String {
    format!("\"{s}\"")
}

fn parse_field(status: &str, key: &str) -> Option<String> {
    status
        .lines()
        .find_map(|l| l.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')))
        .map(str::to_string)
}

fn parse_link_status(status: &str) -> LinkStatus {
    LinkStatus {
        associated: parse_field(status, "wpa_state").as_deref() == Some("COMPLETED"),
        ip: parse_field(status, "ip_address"),
    }
}
