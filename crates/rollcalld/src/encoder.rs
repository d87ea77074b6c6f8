//! Client side of the external face engine.
//!
//! Detection and encoding run out of process behind
//! `org.rollcall.FaceEngine1`; the daemon ships image bytes over the bus
//! and maps the reply rows back into [`DetectedFace`] values.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zbus::zvariant::Type;

use rollcall_core::{DetectedFace, Encoding, EngineError, FaceEngine, FaceLocation};

/// One detected face as the engine reports it. Encodings travel as f64
/// because D-Bus has no 32-bit float type.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct FaceRow {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
    pub encoding: Vec<f64>,
}

// `#[zbus::proxy]` generates both `FaceEngine1Proxy` (async) and
// `FaceEngine1ProxyBlocking` (synchronous). Only the blocking variant is
// used here, since the session thread is synchronous.
#[zbus::proxy(
    interface = "org.rollcall.FaceEngine1",
    default_service = "org.rollcall.FaceEngine1",
    default_path = "/org/rollcall/FaceEngine1"
)]
trait FaceEngine1 {
    async fn detect(&self, image: &[u8]) -> zbus::Result<Vec<FaceRow>>;
}

/// [`FaceEngine`] backed by the bus service.
pub struct BusFaceEngine {
    proxy: FaceEngine1ProxyBlocking<'static>,
}

impl BusFaceEngine {
    /// Connect to the session bus and bind the engine proxy at `service`.
    ///
    /// Uses a generous method timeout so a stuck engine cannot hang the
    /// session thread forever.
    pub fn connect(service: &str) -> Result<Self, EngineError> {
        let conn = zbus::blocking::connection::Builder::session()
            .map_err(bus_error)?
            .method_timeout(Duration::from_secs(30))
            .build()
            .map_err(bus_error)?;
        let proxy = FaceEngine1ProxyBlocking::builder(&conn)
            .destination(service.to_string())
            .map_err(bus_error)?
            .build()
            .map_err(bus_error)?;
        Ok(BusFaceEngine { proxy })
    }
}

impl FaceEngine for BusFaceEngine {
    fn detect_faces(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, EngineError> {
        let rows = self.proxy.detect(image).map_err(bus_error)?;
        Ok(rows.into_iter().map(to_face).collect())
    }
}

fn to_face(row: FaceRow) -> DetectedFace {
    DetectedFace {
        location: FaceLocation {
            top: row.top,
            right: row.right,
            bottom: row.bottom,
            left: row.left,
        },
        encoding: Encoding::new(row.encoding.into_iter().map(|v| v as f32).collect()),
    }
}

/// A method error is the engine refusing this particular image; every
/// other failure means the service itself is unreachable.
fn bus_error(err: zbus::Error) -> EngineError {
    match err {
        zbus::Error::MethodError(name, detail, _) => {
            EngineError::RejectedImage(detail.unwrap_or_else(|| name.to_string()))
        }
        other => EngineError::Unavailable(other.to_string()),
    }
}
