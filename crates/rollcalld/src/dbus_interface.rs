use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use zbus::interface;

use rollcall_core::CacheHandle;
use rollcall_store::{AttendanceLedger, GalleryStore};

use crate::session::SessionHandle;

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    pub session: SessionHandle,
    pub gallery: Arc<dyn GalleryStore>,
    pub ledger: Arc<AttendanceLedger>,
    pub cache: CacheHandle,
    pub threshold: f32,
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Identify the faces in a probe image and record attendance for
    /// everyone recognized. Returns a JSON list with one outcome per
    /// detected face.
    async fn mark_attendance(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "mark_attendance requested");
        let outcomes = self.session.mark(vec![image]).await.map_err(failed)?;
        to_json(&outcomes)
    }

    /// Register reference images for one person and rebuild the encoding
    /// cache. Returns a JSON outcome.
    async fn register_face(&self, name: &str, images: Vec<Vec<u8>>) -> zbus::fdo::Result<String> {
        tracing::info!(name, images = images.len(), "register_face requested");
        let outcome = self
            .session
            .register(name.to_string(), images)
            .await
            .map_err(failed)?;
        to_json(&outcome)
    }

    /// Attendance records for one date (YYYY-MM-DD) as a JSON list. A
    /// date with no records yields an empty list, not an error.
    async fn attendance(&self, date: &str) -> zbus::fdo::Result<String> {
        let date = parse_date(date)?;
        let ledger = self.ledger.clone();
        let records = tokio::task::spawn_blocking(move || ledger.read(date))
            .await
            .map_err(failed)?
            .map_err(failed)?;
        to_json(&records)
    }

    /// Attendance records between two dates inclusive, oldest date
    /// first, as a JSON list.
    async fn attendance_between(&self, from: &str, to: &str) -> zbus::fdo::Result<String> {
        let from = parse_date(from)?;
        let to = parse_date(to)?;
        let ledger = self.ledger.clone();
        let records = tokio::task::spawn_blocking(move || ledger.read_range(from, to))
            .await
            .map_err(failed)?
            .map_err(failed)?;
        to_json(&records)
    }

    /// Every date with at least one record, newest first, as a JSON
    /// list.
    async fn attendance_dates(&self) -> zbus::fdo::Result<String> {
        let ledger = self.ledger.clone();
        let dates = tokio::task::spawn_blocking(move || ledger.dates())
            .await
            .map_err(failed)?
            .map_err(failed)?;
        to_json(&dates)
    }

    /// Names with at least one stored reference image, as a JSON list.
    async fn identities(&self) -> zbus::fdo::Result<String> {
        let gallery = self.gallery.clone();
        let names = tokio::task::spawn_blocking(move || gallery.list_identities())
            .await
            .map_err(failed)?
            .map_err(failed)?;
        to_json(&names)
    }

    /// Daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let cache = self.cache.snapshot();
        let ledger = self.ledger.clone();
        let dates = tokio::task::spawn_blocking(move || ledger.dates())
            .await
            .map_err(failed)?
            .map_err(failed)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": cache.identity_count(),
            "encodings": cache.len(),
            "recorded_dates": dates.len(),
            "match_threshold": self.threshold,
        })
        .to_string())
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(failed)
}

fn parse_date(raw: &str) -> zbus::fdo::Result<NaiveDate> {
    raw.parse()
        .map_err(|_| zbus::fdo::Error::InvalidArgs(format!("not a YYYY-MM-DD date: {raw}")))
}

fn failed(err: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}
