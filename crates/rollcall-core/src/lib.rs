//! rollcall-core: identity, encoding, and matching primitives for the
//! attendance service.
//!
//! Face detection and encoding are delegated to an external service
//! behind the [`FaceEngine`] trait; this crate owns what happens to the
//! encodings afterwards.

pub mod cache;
pub mod engine;
pub mod matcher;
pub mod types;

pub use cache::{CacheEntry, CacheHandle, EncodingCache};
pub use engine::{EngineError, FaceEngine};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher};
pub use types::{
    AttendanceRecord, DetectedFace, Encoding, FaceLocation, Identity, IdentityError, MarkOutcome,
    ReferenceImage, RegisterOutcome,
};
