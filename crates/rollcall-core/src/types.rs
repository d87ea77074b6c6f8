use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters never allowed in an identity name. The name doubles as a
/// gallery directory name, so path syntax and shell-hostile characters
/// are rejected outright.
const UNSAFE_CHARS: &[char] = &['/', '\\', '\0', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity name is empty")]
    Empty,
    #[error("identity name exceeds {max} characters", max = Identity::MAX_LEN)]
    TooLong,
    #[error("identity name contains unsafe character {0:?}")]
    UnsafeCharacter(char),
}

/// A validated person name.
///
/// Construction goes through [`Identity::new`], which trims the input and
/// folds spaces to underscores so the name stays a single token on disk.
/// Ordering is byte-wise over the stored name; match tie-breaking relies
/// on that being total and stable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Identity(String);

impl Identity {
    pub const MAX_LEN: usize = 64;

    pub fn new(raw: &str) -> Result<Self, IdentityError> {
        let name = raw.trim().replace(' ', "_");
        if name.is_empty() {
            return Err(IdentityError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(IdentityError::TooLong);
        }
        if name.starts_with('.') {
            return Err(IdentityError::UnsafeCharacter('.'));
        }
        if let Some(c) = name
            .chars()
            .find(|c| UNSAFE_CHARS.contains(c) || c.is_control())
        {
            return Err(IdentityError::UnsafeCharacter(c));
        }
        Ok(Identity(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Identity::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Face encoding vector produced by the external engine.
///
/// Dimensionality is fixed by the engine; this crate only compares
/// encodings, it never inspects individual components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Encoding { values }
    }

    /// Euclidean distance between two encodings, on the engine's unit
    /// scale. Encodings of different dimensionality are never comparable
    /// and yield infinity, so they can never fall under a match threshold.
    pub fn distance(&self, other: &Encoding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Pixel bounds of a detected face, in the engine's (top, right, bottom,
/// left) convention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

/// One face found in an image: where it is and its encoding.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub location: FaceLocation,
    pub encoding: Encoding,
}

/// A stored gallery image, ready for encoding.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub identity: Identity,
    /// Gallery-relative label, e.g. "Alice/2.jpg". Used in logs.
    pub label: String,
    pub bytes: Vec<u8>,
}

/// One attendance row: a person recorded present on a date at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttendanceRecord {
    pub name: Identity,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Outcome of processing one detected face during mark-attendance.
///
/// These are user-facing statuses, not failures; the serialized form is
/// what the daemon hands to its clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarkOutcome {
    /// Recorded for the first time on `date`.
    Marked {
        name: Identity,
        date: NaiveDate,
        time: NaiveTime,
        distance: f32,
    },
    /// Already in the ledger; `time` is the original record's.
    AlreadyMarked {
        name: Identity,
        date: NaiveDate,
        time: NaiveTime,
    },
    /// Nearest gallery entry was beyond the match threshold. `distance`
    /// is the closest candidate seen, absent when the cache is empty.
    NoMatch { distance: Option<f32> },
    /// No face found in any probe image.
    NoFaceDetected,
}

/// Outcome of a registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegisterOutcome {
    Registered {
        name: Identity,
        images_added: usize,
        /// Cache size after the rebuild that follows registration.
        cache_entries: usize,
    },
    InvalidIdentity { reason: String },
    NoImage,
    /// One of the submitted images held no detectable face; nothing was
    /// stored.
    NoFaceDetected { image_index: usize },
    /// One of the submitted images is not JPEG or PNG; nothing was
    /// stored.
    UnsupportedImage { image_index: usize },
}
