//! CLI handler for headless recording.
//!
//! Drives one full session from the terminal: camera access, a timed
//! recording, stop, then accept.

use crate::app;
use crate::config::Config;
use crate::global;
use crate::recorder::{format_elapsed, LocatorRegistry, RecordingSession, SessionState};
use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::time::Instant;

use super::args::RecordCliArgs;

pub async fn handle_record_command(args: RecordCliArgs) -> Result<()> {
    let mut config = Config::load()?;
    if args.save_local && config.upload.output_dir.is_none() {
        config.upload.output_dir = Some(global::recordings_dir()?);
    }

    let mut session = app::build_session(&config, LocatorRegistry::default())?;
    let result = record(&mut session, Duration::from_secs(args.seconds)).await;
    session.teardown();
    result
}

async fn record(session: &mut RecordingSession, length: Duration) -> Result<()> {
    println!("Requesting camera and microphone access...");
    if session.acquire().await? != SessionState::Previewing {
        return Err(anyhow!("Camera access was not granted"));
    }

    session.start()?;
    println!("Recording for {}s (ctrl-c stops early)...", length.as_secs());

    let deadline = tokio::time::sleep_until(Instant::now() + length);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping early");
                break;
            }
            event = session.next_event() => session.handle_event(event),
        }
        // Encoder failures end the attempt on their own.
        if !session.state().is_capturing() {
            break;
        }
    }

    if session.state().is_capturing() {
        session.stop().await?;
    }

    let Some(artifact) = session.artifact() else {
        return Err(anyhow!(
            "{}",
            session.last_error().unwrap_or("Recording produced no video")
        ));
    };
    println!(
        "Recorded {} ({} bytes, {} chunks)",
        format_elapsed(artifact.duration_seconds),
        artifact.size(),
        artifact.chunk_count
    );

    session.accept().await?;
    let status = session.status_handle().get();
    if let Some(video) = status.last_upload {
        println!("Saved video {} ({})", video.id, video.url);
    }

    Ok(())
}
