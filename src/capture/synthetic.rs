//! Test-pattern camera.
//!
//! Stands in for real hardware on headless machines and in tests. Each granted
//! stream owns one audio and one video track; its encoder emits a fixed-size
//! chunk every `chunk_interval` while recording.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::{
    CaptureError, CaptureProvider, Encoder, EncoderEvent, EncoderSink, MediaConstraints,
    MediaStream, TrackKind, TrackState,
};
use crate::config::DeviceConfig;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub chunk_interval: Duration,
    pub chunk_bytes: usize,
    pub deny_permission: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_millis(250),
            chunk_bytes: 4096,
            deny_permission: false,
        }
    }
}

impl From<&DeviceConfig> for SyntheticConfig {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            chunk_interval: Duration::from_millis(config.chunk_interval_ms.max(1)),
            chunk_bytes: config.chunk_bytes.max(1),
            deny_permission: config.deny_permission,
        }
    }
}

pub struct SyntheticProvider {
    config: SyntheticConfig,
    issued: Mutex<Vec<Arc<AtomicBool>>>,
    requests: AtomicUsize,
}

impl SyntheticProvider {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            issued: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
        }
    }

    /// A provider whose consent prompt is always refused.
    pub fn denying() -> Self {
        Self::new(SyntheticConfig {
            deny_permission: true,
            ..SyntheticConfig::default()
        })
    }

    /// Number of hardware tracks handed out and not yet stopped.
    pub fn live_tracks(&self) -> usize {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|live| live.load(Ordering::SeqCst))
            .count()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureProvider for SyntheticProvider {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if self.config.deny_permission {
            warn!("Synthetic camera refusing capture request");
            return Err(CaptureError::PermissionDenied);
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push((TrackKind::Video, Arc::new(AtomicBool::new(true))));
        }
        if constraints.audio {
            tracks.push((TrackKind::Audio, Arc::new(AtomicBool::new(true))));
        }
        if tracks.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "no audio or video requested".to_string(),
            ));
        }

        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tracks.iter().map(|(_, live)| Arc::clone(live)));

        let stream = SyntheticStream {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
            config: self.config.clone(),
        };
        info!("Synthetic camera granted stream {}", stream.id);
        Ok(Box::new(stream))
    }
}

struct SyntheticStream {
    id: String,
    tracks: Vec<(TrackKind, Arc<AtomicBool>)>,
    config: SyntheticConfig,
}

impl MediaStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<(TrackKind, TrackState)> {
        self.tracks
            .iter()
            .map(|(kind, live)| {
                let state = if live.load(Ordering::SeqCst) {
                    TrackState::Live
                } else {
                    TrackState::Ended
                };
                (*kind, state)
            })
            .collect()
    }

    fn stop_tracks(&mut self) {
        for (kind, live) in &self.tracks {
            if live.swap(false, Ordering::SeqCst) {
                debug!("Stopped synthetic {:?} track on stream {}", kind, self.id);
            }
        }
    }

    fn create_encoder(
        &self,
        mime_type: &str,
        sink: EncoderSink,
    ) -> Result<Box<dyn Encoder>, CaptureError> {
        let liveness = self
            .tracks
            .iter()
            .map(|(_, live)| Arc::clone(live))
            .collect();

        debug!("Synthetic encoder for {} producing {}", self.id, mime_type);
        Ok(Box::new(SyntheticEncoder {
            config: self.config.clone(),
            liveness,
            sink: Some(sink),
            control: None,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Pause,
    Resume,
    Stop,
}

struct SyntheticEncoder {
    config: SyntheticConfig,
    liveness: Vec<Arc<AtomicBool>>,
    sink: Option<EncoderSink>,
    control: Option<mpsc::UnboundedSender<Control>>,
}

impl SyntheticEncoder {
    fn send(&self, control: Control) {
        if let Some(tx) = &self.control {
            let _ = tx.send(control);
        }
    }
}

impl Encoder for SyntheticEncoder {
    fn start(&mut self) -> Result<(), CaptureError> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| CaptureError::Encoder("encoder already started".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.control = Some(tx);
        tokio::spawn(run_encoder(
            sink,
            rx,
            self.config.clone(),
            self.liveness.clone(),
        ));
        Ok(())
    }

    fn pause(&mut self) {
        self.send(Control::Pause);
    }

    fn resume(&mut self) {
        self.send(Control::Resume);
    }

    fn stop(&mut self) {
        self.send(Control::Stop);
    }
}

async fn run_encoder(
    sink: EncoderSink,
    mut control: mpsc::UnboundedReceiver<Control>,
    config: SyntheticConfig,
    liveness: Vec<Arc<AtomicBool>>,
) {
    let mut ticker = time::interval_at(Instant::now() + config.chunk_interval, config.chunk_interval);
    let mut paused = false;
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if paused {
                    // nothing is captured while paused
                } else if liveness.iter().any(|live| !live.load(Ordering::SeqCst)) {
                    let _ = sink.send(EncoderEvent::Error("capture track ended".to_string()));
                    break;
                } else {
                    sequence += 1;
                    let chunk = Bytes::from(vec![(sequence % 251) as u8; config.chunk_bytes]);
                    if sink.send(EncoderEvent::Data(chunk)).is_err() {
                        debug!("Synthetic encoder sink closed, exiting");
                        break;
                    }
                }
            }
            command = control.recv() => match command {
                Some(Control::Pause) => {
                    if !paused {
                        paused = true;
                        let _ = sink.send(EncoderEvent::Paused);
                    }
                }
                Some(Control::Resume) => {
                    if paused {
                        paused = false;
                        let _ = sink.send(EncoderEvent::Resumed);
                    }
                }
                Some(Control::Stop) | None => {
                    let _ = sink.send(EncoderEvent::Stopped);
                    break;
                }
            }
        }
    }

    debug!("Synthetic encoder finished after {} chunks", sequence);
}
