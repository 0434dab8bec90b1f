//! Temporary access point with a credential capture endpoint
//!
//! Stands up hostapd + dnsmasq on the WiFi interface and serves a small
//! HTTP listener on the AP subnet. A phone that joins the AP submits the
//! target network's credentials with `POST /credentials` (JSON body); the
//! body is handed to the engine as the strategy payload.

use std::path::PathBuf;
use std::process::Stdio;

use http_body_util::BodyExt;
use log::{debug, info, warn};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pisetup_engine::radio::HotspotControl;

const AP_ADDRESS: &str = "192.168.4.1";
const AP_PREFIX: &str = "192.168.4.1/24";
const CAPTURE_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum HotspotError {
    #[error("hotspot: {0}")]
    Io(#[from] std::io::Error),
    #[error("hotspot is not running")]
    NotRunning,
    #[error("capture listener closed")]
    ListenerClosed,
}

struct Running {
    hostapd: Child,
    dnsmasq: Child,
    server: JoinHandle<()>,
    submissions: mpsc::Receiver<Vec<u8>>,
}

pub struct HostapdHotspot {
    iface: String,
    run_dir: PathBuf,
    running: Option<Running>,
}

impl HostapdHotspot {
    pub fn new(iface: impl Into<String>, run_dir: PathBuf) -> Self {
        Self { iface: iface.into(), run_dir, running: None }
    }

    fn hostapd_conf(&self, ssid: &str, passphrase: &str) -> String {
        format!(
            "interface={}\n\
             driver=nl80211\n\
             ssid={ssid}\n\
             hw_mode=g\n\
             channel=7\n\
             wmm_enabled=0\n\
             macaddr_acl=0\n\
             auth_algs=1\n\
             ignore_broadcast_ssid=0\n\
             wpa=2\n\
             wpa_passphrase={passphrase}\n\
             wpa_key_mgmt=WPA-PSK\n\
             wpa_pairwise=TKIP\n\
             rsn_pairwise=CCMP\n",
            self.iface
        )
    }

    fn dnsmasq_conf(&self) -> String {
        format!(
            "interface={}\n\
             dhcp-range=192.168.4.2,192.168.4.20,255.255.255.0,24h\n\
             dhcp-option=3,{AP_ADDRESS}\n\
             dhcp-option=6,{AP_ADDRESS}\n\
             listen-address={AP_ADDRESS}\n\
             address=/#/{AP_ADDRESS}\n",
            self.iface
        )
    }

    async fn configure_interface(&self) -> Result<(), HotspotError> {
        // Static AP address; flushed again on stop
        run_ip(&["addr", "flush", "dev", &self.iface]).await?;
        run_ip(&["addr", "add", AP_PREFIX, "dev", &self.iface]).await?;
        run_ip(&["link", "set", &self.iface, "up"]).await
    }

    async fn deconfigure_interface(&self) {
        if let Err(e) = run_ip(&["addr", "flush", "dev", &self.iface]).await {
            warn!("failed to flush {}: {e}", self.iface);
        }
    }
}

async fn run_ip(args: &[&str]) -> Result<(), HotspotError> {
    let status = Command::new("ip").args(args).status().await?;
    if !status.success() {
        return Err(HotspotError::Io(std::io::Error::other(format!(
            "ip {} exited with {status}",
            args.join(" ")
        ))));
    }
    Ok(())
}

impl HotspotControl for HostapdHotspot {
    type Error = HotspotError;

    async fn start(&mut self, ssid: &str, passphrase: &str) -> Result<(), HotspotError> {
        tokio::fs::create_dir_all(&self.run_dir).await?;
        let hostapd_conf = self.run_dir.join("hostapd.conf");
        let dnsmasq_conf = self.run_dir.join("dnsmasq.conf");
        tokio::fs::write(&hostapd_conf, self.hostapd_conf(ssid, passphrase)).await?;
        tokio::fs::write(&dnsmasq_conf, self.dnsmasq_conf()).await?;

        self.configure_interface().await?;

        let hostapd = Command::new("hostapd")
            .arg(&hostapd_conf)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let dnsmasq = Command::new("dnsmasq")
            .arg("--no-daemon")
            .arg("--conf-file")
            .arg(&dnsmasq_conf)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, submissions) = mpsc::channel(4);
        let listener =
            tokio::net::TcpListener::bind((AP_ADDRESS, CAPTURE_PORT)).await?;
        info!("capture endpoint on http://{AP_ADDRESS}:{CAPTURE_PORT}/credentials");
        let server = tokio::spawn(serve_capture(listener, tx));

        self.running = Some(Running { hostapd, dnsmasq, server, submissions });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HotspotError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        running.server.abort();
        if let Err(e) = running.hostapd.kill().await {
            warn!("failed to kill hostapd: {e}");
        }
        if let Err(e) = running.dnsmasq.kill().await {
            warn!("failed to kill dnsmasq: {e}");
        }
        self.deconfigure_interface().await;
        Ok(())
    }

    async fn next_submission(&mut self) -> Result<Vec<u8>, HotspotError> {
        let running = self.running.as_mut().ok_or(HotspotError::NotRunning)?;
        running.submissions.recv().await.ok_or(HotspotError::ListenerClosed)
    }
}

async fn serve_capture(listener: tokio::net::TcpListener, tx: mpsc::Sender<Vec<u8>>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("capture accept failed: {e}");
                continue;
            }
        };
        debug!("capture client {addr}");
        let io = hyper_util::rt::TokioIo::new(stream);
        let tx = tx.clone();
        tokio::spawn(async move {
            let builder = hyper_util::server::conn::auto::Builder::new(
                hyper_util::rt::tokio::TokioExecutor::new(),
            );
            let conn = builder.serve_connection(
                io,
                hyper::service::service_fn(move |r| handle_request(r, tx.clone())),
            );
            if let Err(e) = conn.await {
                debug!("capture connection error: {e:?}");
            }
        });
    }
}

type CaptureResponse = hyper::Response<http_body_util::Full<hyper::body::Bytes>>;

async fn handle_request(
    r: hyper::Request<hyper::body::Incoming>,
    tx: mpsc::Sender<Vec<u8>>,
) -> Result<CaptureResponse, hyper::Error> {
    match (r.method(), r.uri().path()) {
        (&hyper::Method::POST, "/credentials") => {
            let body = r.into_body().collect().await?.to_bytes();
            if tx.send(body.to_vec()).await.is_err() {
                return Ok(respond(
                    hyper::StatusCode::SERVICE_UNAVAILABLE,
                    "provisioning no longer waiting\n",
                ));
            }
            Ok(respond(hyper::StatusCode::OK, "{\"ok\":true}\n"))
        }
        (&hyper::Method::GET, "/") => Ok(respond(
            hyper::StatusCode::OK,
            "POST {\"ssid\":\"...\",\"passphrase\":\"...\",\"security\":\"wpa-psk|open\"} to /credentials\n",
        )),
        _ => Ok(respond(hyper::StatusCode::NOT_FOUND, "not found\n")),
    }
}

fn respond(status: hyper::StatusCode, body: &'static str) -> CaptureResponse {
    let mut r = hyper::Response::new(http_body_util::Full::new(hyper::body::Bytes::from(body)));
    *r.status_mut() = status;
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_templates() {
        let h = HostapdHotspot::new("wlan0", PathBuf::from("/tmp/pisetup"));
        let conf = h.hostapd_conf("PiWiFiSetup", "wifisetup123");
        assert!(conf.contains("interface=wlan0"));
        assert!(conf.contains("ssid=PiWiFiSetup"));
        assert!(conf.contains("wpa_passphrase=wifisetup123"));
        assert!(conf.contains("wpa_key_mgmt=WPA-PSK"));

        let dns = h.dnsmasq_conf();
        assert!(dns.contains("interface=wlan0"));
        assert!(dns.contains("dhcp-range=192.168.4.2,192.168.4.20"));
    }
}
