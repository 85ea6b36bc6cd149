//! Elapsed recording time.
//!
//! Only active recording time counts: the counter halts while the session is
//! paused and picks up where it left off on resume. A ticker task republishes
//! the whole-second value once per second for display.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Copy)]
struct ElapsedClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl ElapsedClock {
    fn start(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(now);
    }

    fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }
}

pub struct ElapsedCounter {
    clock: Arc<Mutex<ElapsedClock>>,
    seconds: Arc<watch::Sender<u64>>,
    ticker: Option<JoinHandle<()>>,
}

impl Default for ElapsedCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl ElapsedCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            clock: Arc::new(Mutex::new(ElapsedClock::default())),
            seconds: Arc::new(tx),
            ticker: None,
        }
    }

    /// Reset to zero and begin ticking.
    pub fn start(&mut self) {
        self.cancel();
        lock(&self.clock).start(Instant::now());
        self.seconds.send_replace(0);

        let clock = Arc::clone(&self.clock);
        let seconds = Arc::clone(&self.seconds);
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + TICK, TICK);
            loop {
                interval.tick().await;
                let elapsed = lock(&clock).elapsed(Instant::now()).as_secs();
                seconds.send_replace(elapsed);
            }
        }));
    }

    pub fn pause(&self) {
        lock(&self.clock).pause(Instant::now());
        self.publish();
    }

    pub fn resume(&self) {
        lock(&self.clock).resume(Instant::now());
    }

    /// Freeze the counter, cancel the ticker and return the final seconds.
    pub fn stop(&mut self) -> u64 {
        lock(&self.clock).pause(Instant::now());
        self.cancel();
        self.publish()
    }

    /// Cancel the ticker and clear the display back to zero.
    pub fn reset(&mut self) {
        self.cancel();
        *lock(&self.clock) = ElapsedClock::default();
        self.seconds.send_replace(0);
    }

    /// Cancel the ticker without touching the recorded value.
    pub fn cancel(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            debug!("Elapsed counter ticker cancelled");
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn seconds(&self) -> u64 {
        lock(&self.clock).elapsed(Instant::now()).as_secs()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.seconds.subscribe()
    }

    fn publish(&self) -> u64 {
        let seconds = self.seconds();
        self.seconds.send_replace(seconds);
        seconds
    }
}

impl Drop for ElapsedCounter {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(clock: &Mutex<ElapsedClock>) -> std::sync::MutexGuard<'_, ElapsedClock> {
    clock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `MM:SS`, zero padded. Minutes keep growing past 59.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
