//! Host-side relay: accepts one producer at a time and pipes its frames
//! into an encoder writing a virtual capture device.
//!
//! Requires the producer port to be forwarded to this host first, e.g.
//! `adb reverse tcp:5000 tcp:5000`.
//!
//! Run with: `camwire-relay --port 5000 --device /dev/video20`

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use camwire::config::{DEFAULT_PORT, DEFAULT_PROGRAM, DEFAULT_VIDEO_DEVICE};
use camwire::relay::FrameServer;
use camwire::SubprocessConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "camwire-relay",
    about = "Relay phone camera frames into a v4l2 loopback device",
    version
)]
struct Cli {
    /// Listen port
    #[arg(short, long, env = "CAMWIRE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Listen address
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Virtual capture device written by the encoder
    #[arg(short, long, env = "CAMWIRE_DEVICE", default_value = DEFAULT_VIDEO_DEVICE)]
    device: PathBuf,

    /// Encoder executable (must accept ffmpeg arguments)
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_PROGRAM)]
    program: PathBuf,

    /// Pause after preempting a session, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 200)]
    settle_ms: u64,

    /// Time the encoder gets to exit after end of input, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    grace_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut subprocess = SubprocessConfig::ffmpeg(&cli.device)
        .with_grace_period(Duration::from_millis(cli.grace_ms));
    subprocess.program = cli.program.into_os_string();

    let server = FrameServer::builder()
        .bind_addr(cli.bind)
        .port(cli.port)
        .subprocess(subprocess)
        .settle_delay(Duration::from_millis(cli.settle_ms))
        .bind()
        .await?;

    tracing::info!("Target device: {}", cli.device.display());

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping active session");
            server.shutdown().await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_port_and_device_flags() {
        let cli = Cli::try_parse_from(["camwire-relay", "--port", "5001", "--device", "/dev/video7"])
            .unwrap();
        assert_eq!(cli.port, 5001);
        assert_eq!(cli.device, PathBuf::from("/dev/video7"));
        assert_eq!(cli.grace_ms, 1000);
    }

    #[test]
    fn test_port_and_device_read_from_environment() {
        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|name| name.to_os_string())
        };
        assert_eq!(env_of("port"), Some("CAMWIRE_PORT".into()));
        assert_eq!(env_of("device"), Some("CAMWIRE_DEVICE".into()));
    }
}
