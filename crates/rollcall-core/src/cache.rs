//! The encoding cache: every gallery image encoded once, held in memory,
//! replaced wholesale after gallery changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::FaceEngine;
use crate::types::{Encoding, Identity, ReferenceImage};

/// One gallery reference encoding.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub identity: Identity,
    /// Gallery label of the source image, e.g. "Alice/3.jpg".
    pub source: String,
    pub encoding: Encoding,
}

/// Immutable snapshot of every usable gallery encoding.
///
/// Every reference image contributes one independent entry; nothing is
/// averaged or weighted.
#[derive(Debug, Default)]
pub struct EncodingCache {
    entries: Vec<CacheEntry>,
}

impl EncodingCache {
    pub fn from_entries(entries: Vec<CacheEntry>) -> Self {
        EncodingCache { entries }
    }

    /// Encode every reference image through the engine.
    ///
    /// Images the engine cannot use (no detectable face, rejected data)
    /// are skipped with a warning; a reference image with several faces
    /// contributes only the first.
    pub fn from_references(images: &[ReferenceImage], engine: &mut dyn FaceEngine) -> Self {
        let mut entries = Vec::with_capacity(images.len());
        let mut skipped = 0usize;

        for image in images {
            match engine.detect_faces(&image.bytes) {
                Ok(faces) => match faces.into_iter().next() {
                    Some(face) => entries.push(CacheEntry {
                        identity: image.identity.clone(),
                        source: image.label.clone(),
                        encoding: face.encoding,
                    }),
                    None => {
                        skipped += 1;
                        tracing::warn!(
                            image = %image.label,
                            "no detectable face in reference image, skipping"
                        );
                    }
                },
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(
                        image = %image.label,
                        error = %err,
                        "could not encode reference image, skipping"
                    );
                }
            }
        }

        tracing::info!(entries = entries.len(), skipped, "encoding cache built");
        EncodingCache { entries }
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct identities represented in the cache.
    pub fn identity_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.identity.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Shared handle to the current cache.
///
/// Readers take a snapshot and keep using it for the whole operation;
/// [`install`](CacheHandle::install) swaps in a complete replacement in
/// one step. A reader therefore always holds either the old cache or the
/// new one in full, never a mixture.
#[derive(Debug, Clone, Default)]
pub struct CacheHandle {
    current: Arc<RwLock<Arc<EncodingCache>>>,
}

impl CacheHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<EncodingCache> {
        self.current.read().clone()
    }

    pub fn install(&self, cache: EncodingCache) {
        *self.current.write() = Arc::new(cache);
    }
}
