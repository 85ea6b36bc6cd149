pub mod artifact;
pub mod clock;
pub mod session;
pub mod state;

#[cfg(test)]
mod tests;

pub use artifact::{
    extension_for, ArtifactSummary, ChunkBuffer, FinishedArtifact, Locator, LocatorRegistry,
    ResolvedArtifact,
};
pub use clock::{format_elapsed, ElapsedCounter};
pub use session::{RecordingSession, SessionCommand, SessionError, SessionEvent};
pub use state::{PreviewSource, SessionState, SessionStatus, SessionStatusHandle};
