//! BlueZ access via an interactive `bluetoothctl` child
//!
//! The adapter radio and the GATT credentials service each own their own
//! bluetoothctl session. The GATT session is spawned on register and
//! killed on unregister, so tearing an attempt down can never leave a
//! characteristic behind: the registered application dies with the child.

use std::process::Stdio;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use pisetup_engine::radio::{BleEvent, BleRadio, GattHost};
use pisetup_proto::ble::{CREDENTIALS_UUID, SERVICE_UUID};

#[derive(Debug, thiserror::Error)]
pub enum BluezError {
    #[error("bluetoothctl: {0}")]
    Io(#[from] std::io::Error),
    #[error("bluetoothctl exited")]
    Exited,
    #[error("GATT service not registered")]
    NotRegistered,
}

struct CtlSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl CtlSession {
    fn spawn() -> Result<Self, BluezError> {
        let mut child = Command::new("bluetoothctl")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child.stdin.take().ok_or(BluezError::Exited)?;
        let stdout = child.stdout.take().ok_or(BluezError::Exited)?;
        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }

    async fn send(&mut self, cmd: &str) -> Result<(), BluezError> {
        debug!("bluetoothctl> {cmd}");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn next_line(&mut self) -> Result<String, BluezError> {
        self.lines.next_line().await?.ok_or(BluezError::Exited)
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("failed to kill bluetoothctl: {e}");
        }
    }
}

/// Adapter control and connect/disconnect events
pub struct BluezCtl {
    session: CtlSession,
}

impl BluezCtl {
    pub fn spawn() -> Result<Self, BluezError> {
        Ok(Self { session: CtlSession::spawn()? })
    }
}

impl BleRadio for BluezCtl {
    type Error = BluezError;

    async fn power_on(&mut self) -> Result<(), BluezError> {
        self.session.send("power on").await?;
        // Accept pairing without any display or keyboard
        self.session.send("agent NoInputNoOutput").await?;
        self.session.send("default-agent").await
    }

    async fn set_alias(&mut self, name: &str) -> Result<(), BluezError> {
        self.session.send(&format!("system-alias {name}")).await
    }

    async fn set_discoverable(&mut self, on: bool) -> Result<(), BluezError> {
        let flag = if on { "on" } else { "off" };
        self.session.send(&format!("pairable {flag}")).await?;
        self.session.send(&format!("discoverable {flag}")).await
    }

    async fn next_event(&mut self) -> Result<BleEvent, BluezError> {
        loop {
            let line = self.session.next_line().await?;
            if let Some(event) = parse_connection_event(&line) {
                return Ok(event);
            }
        }
    }
}

impl Drop for BluezCtl {
    fn drop(&mut self) {
        // The interactive session dies with the child; close the pairing
        // window through a one-shot invocation instead.
        let _ = std::process::Command::new("bluetoothctl")
            .args(["discoverable", "off"])
            .status();
        let _ = std::process::Command::new("bluetoothctl")
            .args(["pairable", "off"])
            .status();
    }
}

/// GATT server hosting the writable credentials characteristic
pub struct BluezGatt {
    session: Option<CtlSession>,
}

impl BluezGatt {
    pub fn new() -> Self {
        Self { session: None }
    }
}

impl Default for BluezGatt {
    fn default() -> Self {
        Self::new()
    }
}

impl GattHost for BluezGatt {
    type Error = BluezError;

    async fn register(&mut self) -> Result<(), BluezError> {
        let mut session = CtlSession::spawn()?;
        session.send("menu gatt").await?;
        session.send(&format!("register-service {SERVICE_UUID}")).await?;
        // register-service prompts for "Primary (yes/no)"
        session.send("yes").await?;
        session
            .send(&format!("register-characteristic {CREDENTIALS_UUID} write"))
            .await?;
        // register-characteristic prompts for an initial value
        session.send("00").await?;
        session.send("register-application").await?;
        self.session = Some(session);
        Ok(())
    }

    async fn unregister(&mut self) -> Result<(), BluezError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if let Err(e) = session.send("unregister-application").await {
            warn!("unregister-application failed: {e}");
        }
        session.kill().await;
        Ok(())
    }

    async fn next_write(&mut self) -> Result<Vec<u8>, BluezError> {
        let session = self.session.as_mut().ok_or(BluezError::NotRegistered)?;
        let mut value: Vec<u8> = Vec::new();
        let mut in_dump = false;
        loop {
            let line = session.next_line().await?;
            if line.contains("WriteValue") || line.contains("Value:") {
                in_dump = true;
                value.clear();
                continue;
            }
            if in_dump {
                let bytes = parse_hex_dump_line(&line);
                if bytes.is_empty() {
                    if !value.is_empty() {
                        return Ok(value);
                    }
                    in_dump = false;
                } else {
                    value.extend(bytes);
                }
            }
        }
    }
}

/// Pick connect/disconnect changes out of bluetoothctl's event stream,
/// e.g. `[CHG] Device AA:BB:CC:DD:EE:FF Connected: yes`.
fn parse_connection_event(line: &str) -> Option<BleEvent> {
    let rest = line.split("Device ").nth(1)?;
    let address = rest.split_whitespace().next()?;
    if !address.contains(':') {
        return None;
    }
    let address = address.to_string();
    if line.contains("Connected: yes") {
        Some(BleEvent::PeerConnected { address })
    } else if line.contains("Connected: no") {
        Some(BleEvent::PeerDisconnected { address })
    } else {
        None
    }
}

/// Decode one line of bluetoothctl's hex dump output, e.g.
/// `  48 6f 6d 65 4e 65 74 00 73 33 63 72 33 74        HomeNet.s3cr3t`.
/// Returns the decoded bytes, empty when the line is not a dump line.
fn parse_hex_dump_line(line: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    for token in line.split_whitespace() {
        if token.len() == 2
            && let Ok(b) = u8::from_str_radix(token, 16)
        {
            bytes.push(b);
        } else {
            // ASCII gutter reached (or not a dump line at all)
            break;
        }
    }
    bytes
}
