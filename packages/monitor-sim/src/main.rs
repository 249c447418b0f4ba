//! main.rs — fake IntelliVue monitor entry point.
//!
//! Broadcasts discovery beacons, accepts an association from a gateway,
//! and answers numeric polls with jittered canned vitals. Useful for
//! driving the gateway end to end without bedside hardware.

mod sim;

use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use intellivue_proto::{MacAddr, PORT_CONNECTION_INDICATION, PORT_PROTOCOL};
use tracing::{error, info};

use sim::{run_monitor_sim, SimConfig};

#[derive(Parser, Debug)]
#[command(name = "monitor-sim", about = "Protocol-accurate fake IntelliVue monitor")]
struct Args {
    /// Gateway host to announce to (use the broadcast address on a
    /// shared segment)
    #[arg(long, default_value = "127.0.0.1")]
    gateway: Ipv4Addr,

    /// MAC address to announce
    #[arg(long, default_value = "06:08:06:08:00:01")]
    mac: MacAddr,

    /// IP address advertised inside the beacon
    #[arg(long, default_value = "127.0.0.1")]
    ip: Ipv4Addr,

    /// Seconds between connection indications while unassociated
    #[arg(long, default_value = "2")]
    beacon_interval_secs: u64,

    /// Baseline SpO2 in percent
    #[arg(long, default_value = "98")]
    spo2: i32,

    /// Baseline pulse in beats per minute
    #[arg(long, default_value = "72")]
    pulse: i32,

    /// Baseline respiration rate in tenths of breaths per minute
    #[arg(long, default_value = "125")]
    resp_x10: i32,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "monitor_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    info!("monitor-sim v{} — announcing {}", env!("CARGO_PKG_VERSION"), args.mac);

    let config = SimConfig {
        mac: args.mac,
        ip: args.ip,
        beacon_dest: SocketAddr::new(args.gateway.into(), PORT_CONNECTION_INDICATION),
        spo2_pct: args.spo2,
        pulse_bpm: args.pulse,
        resp_rpm_x10: args.resp_x10,
    };
    let listen = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), PORT_PROTOCOL);
    let beacon_bind = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), PORT_CONNECTION_INDICATION);

    if let Err(e) = run_monitor_sim(
        config,
        listen,
        beacon_bind,
        Duration::from_secs(args.beacon_interval_secs),
    )
    .await
    {
        error!("monitor-sim failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
