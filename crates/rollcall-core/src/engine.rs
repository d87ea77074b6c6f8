//! Interface to the external face detection/encoding service.
//!
//! Rollcall never runs inference itself. Detection method and encoding
//! dimensionality belong to the engine; everything downstream only
//! compares the encodings it hands back.

use thiserror::Error;

use crate::types::DetectedFace;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine service cannot be reached.
    #[error("face engine unavailable: {0}")]
    Unavailable(String),
    /// The engine refused the image (corrupt data, unsupported format).
    #[error("face engine rejected image: {0}")]
    RejectedImage(String),
}

/// A face detection + encoding service.
///
/// Returns one entry per face found in the image, each with its pixel
/// location and encoding. An image with no faces yields an empty list,
/// not an error.
pub trait FaceEngine: Send {
    fn detect_faces(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, EngineError>;
}
