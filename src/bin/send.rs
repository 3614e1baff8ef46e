//! Producer stand-in: streams JPEG files to the relay through the full
//! capture pipeline (queue, consumer task, transport).
//!
//! Run with: `camwire-send --port 5000 --fps 30 --repeat 0 frames/*.jpg`
//!
//! With `--status-json`, every connection state change is written to stdout
//! as `{"event":"status","state":"..."}`; logs stay on stderr.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use camwire::config::DEFAULT_PORT;
use camwire::control::{write_stdout_json, ControlEvent};
use camwire::{CaptureOutcome, Producer};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Upper bound on waiting for queued frames before disconnecting.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(
    name = "camwire-send",
    about = "Stream JPEG files to a camwire relay",
    version
)]
struct Cli {
    /// Relay port on 127.0.0.1
    #[arg(short, long, env = "CAMWIRE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Passes over the file list (0 repeats until interrupted)
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Reported frame width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Reported frame height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Queue capacity
    #[arg(long, default_value_t = camwire::queue::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Write connection status as JSON lines on stdout
    #[arg(long)]
    status_json: bool,

    /// JPEG files, sent in order
    #[arg(required = true, value_name = "JPEG")]
    files: Vec<PathBuf>,
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

    let mut frames = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let bytes = tokio::fs::read(path).await?;
        frames.push(Bytes::from(bytes));
    }

    let producer = Producer::builder()
        .queue_capacity(cli.queue_capacity)
        .start();

    let status_task = cli.status_json.then(|| {
        let mut rx = producer.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(state) => {
                        if let Err(e) = write_stdout_json(&ControlEvent::Status { state }) {
                            tracing::warn!("Status write failed: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} status events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    if let Err(e) = producer.connect(cli.port).await {
        tracing::error!("Cannot reach relay on port {}: {}", cli.port, e);
    } else {
        tokio::select! {
            _ = stream_frames(&producer, &frames, &cli) => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        }
        drain(&producer).await;
    }

    producer.shutdown().await;
    let (sent, dropped) = (producer.frames_sent(), producer.frames_dropped());
    tracing::info!("Sent {} frames, dropped {}", sent, dropped);

    // Closes the state channel so the status task can finish.
    drop(producer);
    if let Some(task) = status_task {
        let _ = task.await;
        write_stdout_json(&ControlEvent::Stats { sent, dropped })?;
    }

    Ok(())
}

/// Feed the files through the capture entry point at the requested rate.
async fn stream_frames(producer: &Producer, frames: &[Bytes], cli: &Cli) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / cli.fps.max(1));
    let mut pass = 0;

    while cli.repeat == 0 || pass < cli.repeat {
        for jpeg in frames {
            ticker.tick().await;
            if producer.on_frame_captured(jpeg.clone(), cli.width, cli.height)
                == CaptureOutcome::Skipped
            {
                tracing::warn!("Connection lost, stopping");
                return;
            }
        }
        pass += 1;
    }
}

/// Give the consumer a moment to write what is still queued or in flight.
async fn drain(producer: &Producer) {
    if !producer.flush(DRAIN_TIMEOUT).await {
        tracing::warn!("{} frames still pending after {:?}", producer.pending_frames(), DRAIN_TIMEOUT);
    }
}
