//! pisetup daemon - provisions a headless device with WiFi over Bluetooth
//!
//! Runs the credential-acquisition engine against the stock BlueZ /
//! wpa_supplicant / hostapd tool set. A phone pairs with the advertised
//! device and hands over WiFi credentials via a GATT write, a WiFi Direct
//! handshake, or the fallback capture hotspot; the daemon commits them and
//! verifies connectivity.

mod platform;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::info;

use pisetup_engine::{
    CredentialStore, EngineConfig, GattWrite, HotspotShare, NetworkCommitter, Orchestrator,
    Strategy, StrategyKind, WifiDirectHandshake,
};
use platform::{BluezCtl, BluezGatt, HostapdHotspot, WpaCli};

/// SSID/passphrase of the temporary capture hotspot
const AP_SSID: &str = "PiWiFiSetup";
const AP_PASSPHRASE: &str = "wifisetup123";

#[derive(Parser)]
#[command(name = "pisetup")]
#[command(about = "WiFi provisioning daemon for headless devices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the provisioning engine
    Run {
        /// WiFi interface to configure
        #[arg(long, default_value = "wlan0")]
        iface: String,
        /// Bluetooth name the device advertises under
        #[arg(long, default_value = "PiWiFiSetup")]
        name: String,
        /// Strategy priority order
        #[arg(long, default_value = "gatt,p2p,hotspot", value_delimiter = ',')]
        strategies: Vec<StrategyKind>,
        /// Seconds each strategy attempt gets before timing out
        #[arg(long, default_value = "60")]
        attempt_timeout: u64,
        /// Commit attempts per strategy before advancing to the next
        #[arg(long, default_value = "2")]
        max_retries: u32,
        /// Do not try previously stored credentials at startup
        #[arg(long)]
        no_resume: bool,
    },
    /// Show stored credentials and live link status
    Status {
        #[arg(long, default_value = "wlan0")]
        iface: String,
    },
    /// Forget stored credentials
    Clear,
}

fn pisetup_home() -> PathBuf {
    std::env::var("PISETUP_HOME").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .expect("could not determine home directory")
            .join(".pisetup")
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let home = pisetup_home();
    std::fs::create_dir_all(&home)?;
    let store = CredentialStore::new(&home);

    match cli.command {
        Commands::Run { iface, name, strategies, attempt_timeout, max_retries, no_resume } => {
            run(store, home, iface, name, strategies, attempt_timeout, max_retries, no_resume)
                .await
        }
        Commands::Status { iface } => status(store, iface).await,
        Commands::Clear => {
            store.clear()?;
            println!("stored credentials cleared");
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    store: CredentialStore,
    home: PathBuf,
    iface: String,
    name: String,
    kinds: Vec<StrategyKind>,
    attempt_timeout: u64,
    max_retries: u32,
    no_resume: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let strategies: Vec<Strategy<BluezGatt, WpaCli, HostapdHotspot>> = kinds
        .iter()
        .map(|kind| match kind {
            StrategyKind::GattWrite => Strategy::Gatt(GattWrite::new(BluezGatt::new())),
            StrategyKind::WifiDirectHandshake => {
                Strategy::WifiDirect(WifiDirectHandshake::new(WpaCli::new(&iface)))
            }
            StrategyKind::HotspotShare => Strategy::Hotspot(HotspotShare::new(
                HostapdHotspot::new(&iface, home.join("hotspot")),
                AP_SSID,
                AP_PASSPHRASE,
            )),
        })
        .collect();

    let committer = NetworkCommitter::new(
        WpaCli::new(&iface),
        Duration::from_secs(30),
        Duration::from_secs(2),
    );

    let config = EngineConfig {
        device_name: name,
        attempt_timeout: Duration::from_secs(attempt_timeout),
        max_retries,
        resume_stored: !no_resume,
        ..EngineConfig::default()
    };

    let radio = BluezCtl::spawn()?;
    let mut orchestrator = Orchestrator::new(radio, strategies, store, committer, config);

    tokio::select! {
        result = orchestrator.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}

async fn status(store: CredentialStore, iface: String) -> Result<(), Box<dyn std::error::Error>> {
    match store.load() {
        Some(record) => {
            println!("stored network: {} (via {}, security {:?})", record.ssid, record.source, record.security);
        }
        None => println!("no stored credentials"),
    }

    let committer = NetworkCommitter::new(
        WpaCli::new(&iface),
        Duration::from_secs(5),
        Duration::from_secs(1),
    );
    match committer.probe().await {
        Some(link) if link.associated => {
            println!(
                "link: associated, ip {}",
                link.ip.as_deref().unwrap_or("not yet assigned")
            );
        }
        Some(_) => println!("link: not associated"),
        None => println!("link: status unavailable"),
    }
    Ok(())
}
