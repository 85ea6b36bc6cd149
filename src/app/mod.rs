use crate::api::{ApiCommand, ApiServer};
use crate::capture::{SyntheticConfig, SyntheticProvider};
use crate::config::Config;
use crate::recorder::{LocatorRegistry, RecordingSession};
use crate::upload::http::HttpUploader;
use crate::upload::local::LocalDirUploader;
use crate::upload::UploadHandler;
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting vidintro service");

    let config = Config::load()?;

    let (tx, rx) = mpsc::channel::<ApiCommand>(10);
    let locators = LocatorRegistry::default();
    let session = build_session(&config, locators.clone())?;

    let api_server = ApiServer::new(tx, session.status_handle(), locators, &config);
    let port = api_server.port();
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    info!("vidintro is ready!");
    info!("Grant camera access: curl -X POST http://127.0.0.1:{}/permission", port);
    info!("Then start recording: curl -X POST http://127.0.0.1:{}/start", port);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };
    drive(session, rx, shutdown).await;

    Ok(())
}

/// Assemble a session from config: the synthetic camera, plus a local
/// directory hand-off when `upload.output_dir` is set, the REST backend
/// otherwise.
pub fn build_session(config: &Config, locators: LocatorRegistry) -> Result<RecordingSession> {
    let provider = Arc::new(SyntheticProvider::new(SyntheticConfig::from(&config.device)));

    let uploader: Arc<dyn UploadHandler> = match &config.upload.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            info!("Accepted recordings will be written to {:?}", dir);
            Arc::new(LocalDirUploader::new(
                dir.clone(),
                &config.upload.candidate_id,
                &config.upload.title,
            ))
        }
        None => {
            let uploader = HttpUploader::from_config(&config.upload);
            info!("Accepted recordings will be posted to {}", uploader.videos_url());
            Arc::new(uploader)
        }
    };

    Ok(
        RecordingSession::new(provider, uploader, config.recorder.mime_type.clone())
            .with_locators(locators),
    )
}

/// Own the session: serve commands and device events until `shutdown`
/// resolves or every command sender is gone, then release everything.
pub async fn drive(
    mut session: RecordingSession,
    mut rx: mpsc::Receiver<ApiCommand>,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            command = rx.recv() => match command {
                Some(command) => dispatch(&mut session, command).await,
                None => break,
            },
            event = session.next_event() => session.handle_event(event),
        }
    }

    session.teardown();
}

async fn dispatch(session: &mut RecordingSession, command: ApiCommand) {
    let ApiCommand { command, reply } = command;
    let outcome = session.apply(command).await;
    match &outcome {
        Ok(state) => info!("{} -> {}", command.as_str(), state.as_str()),
        Err(e) => error!("Failed to {}: {}", command.as_str(), e),
    }
    if reply.send(outcome).is_err() {
        warn!("API caller went away before the {} result", command.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{SessionCommand, SessionState};
    use tokio::sync::oneshot;

    async fn send(tx: &mpsc::Sender<ApiCommand>, command: SessionCommand) -> SessionState {
        let (reply, outcome) = oneshot::channel();
        tx.send(ApiCommand { command, reply }).await.unwrap();
        outcome.await.unwrap().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_records_and_saves_locally() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.upload.output_dir = Some(dir.path().to_path_buf());
        config.device.chunk_interval_ms = 100;

        let locators = LocatorRegistry::default();
        let session = build_session(&config, locators.clone()).unwrap();
        let mut status = session.status_handle();
        let (tx, rx) = mpsc::channel(8);
        let service = tokio::spawn(drive(session, rx, std::future::pending::<()>()));

        send(&tx, SessionCommand::RequestPermission).await;
        while status.get().state != SessionState::Previewing {
            assert!(status.changed().await);
        }

        assert_eq!(send(&tx, SessionCommand::Start).await, SessionState::Recording);
        tokio::time::sleep(std::time::Duration::from_millis(450)).await;
        assert_eq!(send(&tx, SessionCommand::Stop).await, SessionState::Reviewing);
        assert_eq!(locators.active_count(), 1);

        assert_eq!(send(&tx, SessionCommand::Accept).await, SessionState::NoPermission);
        assert_eq!(locators.active_count(), 0);
        assert!(status.get().last_upload.is_some());

        let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(written.len(), 1);

        drop(tx);
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_drive_tears_down_on_shutdown() {
        let config = Config::default();
        let locators = LocatorRegistry::default();
        let session = build_session(&config, locators).unwrap();
        let status = session.status_handle();
        let (_tx, rx) = mpsc::channel(8);

        drive(session, rx, async {}).await;
        assert_eq!(status.get().state, SessionState::NoPermission);
    }
}
