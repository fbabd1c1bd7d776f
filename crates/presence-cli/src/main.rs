use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use presence_api::{ApiConfig, RecognitionClient};
use presence_core::{
    CheckinAction, CheckinOutcome, CheckinSession, DetectionResult, Notifier, ScanOutcome,
    SessionConfig, SessionError,
};
use presence_hw::{CameraConfig, V4lCamera};

mod config;

#[derive(Parser)]
#[command(name = "presence", about = "Face-recognition check-in kiosk client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan until a face is recognized, then record a check-in
    Checkin,
    /// Scan until a face is recognized, then record a check-out
    Checkout,
    /// Scan and report the recognized identity without submitting
    Scan,
    /// List available camera devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::Config::from_env();

    match cli.command {
        Commands::Checkin => run_flow(&cfg, Some(CheckinAction::CheckIn)).await,
        Commands::Checkout => run_flow(&cfg, Some(CheckinAction::CheckOut)).await,
        Commands::Scan => run_flow(&cfg, None).await,
        Commands::Devices => {
            list_devices();
            Ok(())
        }
    }
}

fn list_devices() {
    let devices = presence_hw::list_devices();
    if devices.is_empty() {
        println!("no capture devices found");
        return;
    }
    for d in devices {
        println!("{}  {} ({})", d.path, d.name, d.driver);
    }
}

/// Prints user-visible events to stdout; the kiosk has no toast layer.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn positive_match(&self, detection: &DetectionResult) {
        println!("match: {}", detection.display_name);
    }

    fn submission_recorded(&self, outcome: &CheckinOutcome) {
        println!("recorded: {} ({})", outcome.action, outcome.record_id);
    }
}

async fn run_flow(cfg: &config::Config, action: Option<CheckinAction>) -> Result<()> {
    let camera = V4lCamera::new(CameraConfig {
        device: cfg.camera_device.clone(),
        warmup_frames: cfg.warmup_frames,
        jpeg_quality: cfg.jpeg_quality,
    });
    let client = RecognitionClient::new(ApiConfig {
        base_url: cfg.api_url.clone(),
        auth_token: cfg.api_token.clone(),
        request_timeout: cfg.request_timeout,
        ..ApiConfig::default()
    })?;

    let (mut session, handle) = CheckinSession::new(
        SessionConfig {
            poll_interval: cfg.poll_interval,
        },
        Box::new(camera),
        Arc::new(client),
        Arc::new(ConsoleNotifier),
    );

    // Ctrl-c tears the session down; the camera is released before exit.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.close();
            }
        });
    }

    session.open()?;
    println!("scanning... look at the camera (ctrl-c to cancel)");

    let detection = match session.scan().await? {
        ScanOutcome::Closed => {
            println!("cancelled");
            return Ok(());
        }
        ScanOutcome::Detected(detection) => detection,
    };

    println!(
        "recognized {} ({})",
        detection.display_name, detection.identity_id
    );

    let Some(action) = action else {
        session.close();
        return Ok(());
    };

    match session.submit(action).await {
        Ok(outcome) => {
            println!(
                "{} recorded for {} at {} (record {})",
                action, detection.display_name, outcome.timestamp, outcome.record_id
            );
            session.close();
            Ok(())
        }
        Err(SessionError::Backend(e)) => {
            // Recoverable on the session side, but the kiosk flow ends here;
            // the message reaches the user verbatim.
            session.close();
            anyhow::bail!("submission rejected: {e}");
        }
        Err(SessionError::Cancelled) => {
            session.close();
            println!("cancelled");
            Ok(())
        }
        Err(e) => {
            session.close();
            Err(e.into())
        }
    }
}
