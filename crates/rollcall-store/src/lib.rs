//! rollcall-store: the face gallery and the attendance ledger.
//!
//! Both stores are plain files under configured directories: reference
//! images as `<gallery>/<identity>/<n>.<ext>`, attendance as one
//! `Attendance_YYYY-MM-DD.csv` per date.

pub mod gallery;
pub mod ledger;

pub use gallery::{FsGallery, GalleryError, GalleryStore};
pub use ledger::{AttendanceLedger, LedgerError};
