//! Chunk buffering, finished recordings and their revocable locators.

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const LOCATOR_SCHEME: &str = "blob:vidintro/";

/// Ordered, append-only fragments of one recording attempt.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Bytes>,
    byte_len: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty flushes are skipped; returns whether it was kept.
    pub fn push(&mut self, chunk: Bytes) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.byte_len += chunk.len();
        self.chunks.push(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    fn concat(self) -> Bytes {
        let mut payload = BytesMut::with_capacity(self.byte_len);
        for chunk in self.chunks {
            payload.extend_from_slice(&chunk);
        }
        payload.freeze()
    }
}

/// Transient reference to an artifact held in a [`LocatorRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    fn generate() -> Self {
        Self(format!("{LOCATOR_SCHEME}{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The opaque part after the scheme, used in `/artifacts/:id` URLs.
    pub fn id(&self) -> &str {
        self.0.strip_prefix(LOCATOR_SCHEME).unwrap_or(&self.0)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub payload: Bytes,
    pub mime_type: String,
}

/// Table of live locators, shared between the session and whatever displays
/// the artifact. Every `create` must be paired with a `revoke`.
#[derive(Debug, Clone, Default)]
pub struct LocatorRegistry {
    entries: Arc<Mutex<HashMap<String, ResolvedArtifact>>>,
}

impl LocatorRegistry {
    pub fn create(&self, payload: Bytes, mime_type: &str) -> Locator {
        let locator = Locator::generate();
        self.lock().insert(
            locator.id().to_string(),
            ResolvedArtifact {
                payload,
                mime_type: mime_type.to_string(),
            },
        );
        debug!("Created artifact locator {}", locator);
        locator
    }

    /// Look up a locator by its id. `None` once revoked.
    pub fn resolve(&self, id: &str) -> Option<ResolvedArtifact> {
        self.lock().get(id).cloned()
    }

    /// Returns false when the locator was already revoked.
    pub fn revoke(&self, locator: &Locator) -> bool {
        let removed = self.lock().remove(locator.id()).is_some();
        if removed {
            debug!("Revoked artifact locator {}", locator);
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ResolvedArtifact>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The concatenated result of one recording attempt.
#[derive(Debug, Clone)]
pub struct FinishedArtifact {
    pub payload: Bytes,
    pub mime_type: String,
    pub locator: Locator,
    pub duration_seconds: u64,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl FinishedArtifact {
    /// Concatenate `chunks` and register a locator for the result.
    pub fn assemble(
        chunks: ChunkBuffer,
        mime_type: &str,
        duration_seconds: u64,
        registry: &LocatorRegistry,
    ) -> Self {
        let chunk_count = chunks.len();
        let payload = chunks.concat();
        let locator = registry.create(payload.clone(), mime_type);
        Self {
            payload,
            mime_type: mime_type.to_string(),
            locator,
            duration_seconds,
            chunk_count,
            created_at: Utc::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            locator: self.locator.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size(),
            duration_seconds: self.duration_seconds,
            chunk_count: self.chunk_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub locator: Locator,
    pub mime_type: String,
    pub size_bytes: usize,
    pub duration_seconds: u64,
    pub chunk_count: usize,
}

/// File extension for a container mime type.
pub fn extension_for(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or(mime_type).trim();
    match base {
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "video/quicktime" => "mov",
        "video/ogg" => "ogv",
        _ => "bin",
    }
}
