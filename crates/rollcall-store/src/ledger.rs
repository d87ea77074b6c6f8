//! Append-only attendance ledger, one CSV file per calendar date.
//!
//! Files are named `Attendance_YYYY-MM-DD.csv` and carry `Name,Date,Time`
//! columns, at most one row per person per date. Rows are only ever
//! appended; history is never rewritten.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use parking_lot::Mutex;
use thiserror::Error;

use rollcall_core::{AttendanceRecord, Identity};

const FILE_PREFIX: &str = "Attendance_";
const FILE_SUFFIX: &str = ".csv";

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Insert-if-absent refusal: the person already has a row for the
    /// date. `time` is the existing record's.
    #[error("{name} is already recorded for {date} (at {time})")]
    DuplicateRecord {
        name: Identity,
        date: NaiveDate,
        time: NaiveTime,
    },
    #[error("attendance storage at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("attendance file {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl LedgerError {
    fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Storage { path: path.into(), source }
    }

    fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        LedgerError::Csv { path: path.into(), source }
    }
}

/// File-backed attendance ledger.
///
/// Check-then-append runs under one ledger-wide lock, which is what
/// makes [`append`](AttendanceLedger::append) an insert-if-absent step:
/// of N concurrent appends for the same person and date, exactly one
/// lands. The files are small (one per date, one row per person), so
/// the coarse lock keeps every operation bounded.
pub struct AttendanceLedger {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl AttendanceLedger {
    /// Open a ledger in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| LedgerError::storage(&dir, e))?;
        Ok(AttendanceLedger { dir, lock: Mutex::new(()) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All records for `date`. A date with no file is simply empty.
    pub fn read(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let _guard = self.lock.lock();
        self.read_unlocked(date)
    }

    /// Whether `name` already has a row for `date`.
    pub fn has_recorded(&self, name: &Identity, date: NaiveDate) -> Result<bool, LedgerError> {
        Ok(self.recorded_at(name, date)?.is_some())
    }

    /// Time of the existing record for `name` on `date`, if any.
    pub fn recorded_at(
        &self,
        name: &Identity,
        date: NaiveDate,
    ) -> Result<Option<NaiveTime>, LedgerError> {
        let _guard = self.lock.lock();
        Ok(lookup(&self.read_unlocked(date)?, name))
    }

    /// Durably append one record, refusing a second row for the same
    /// person and date.
    pub fn append(
        &self,
        name: &Identity,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<AttendanceRecord, LedgerError> {
        let _guard = self.lock.lock();
        if let Some(existing) = lookup(&self.read_unlocked(date)?, name) {
            return Err(LedgerError::DuplicateRecord {
                name: name.clone(),
                date,
                time: existing,
            });
        }

        let path = self.file_path(date);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::storage(&path, e))?;
        // A zero-length file still needs its header row.
        let fresh = file
            .metadata()
            .map_err(|e| LedgerError::storage(&path, e))?
            .len()
            == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        let record = AttendanceRecord { name: name.clone(), date, time };
        writer.serialize(&record).map_err(|e| LedgerError::csv(&path, e))?;
        writer.flush().map_err(|e| LedgerError::storage(&path, e))?;

        tracing::debug!(name = %record.name, date = %date, time = %time, "attendance recorded");
        Ok(record)
    }

    /// Every date with an attendance file, newest first.
    pub fn dates(&self) -> Result<Vec<NaiveDate>, LedgerError> {
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| LedgerError::storage(&self.dir, e))? {
            let entry = entry.map_err(|e| LedgerError::storage(&self.dir, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };
            if let Some(date) = parse_file_date(file_name) {
                dates.push(date);
            }
        }
        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    /// All records across an inclusive date range, oldest date first.
    pub fn read_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut dates = self.dates()?;
        dates.retain(|d| *d >= from && *d <= to);
        dates.sort_unstable();

        let mut records = Vec::new();
        for date in dates {
            records.extend(self.read(date)?);
        }
        Ok(records)
    }

    /// How many days `name` attended within the inclusive range.
    pub fn count_for(
        &self,
        name: &Identity,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<usize, LedgerError> {
        Ok(self
            .read_range(from, to)?
            .iter()
            .filter(|r| &r.name == name)
            .count())
    }

    fn file_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{date}{FILE_SUFFIX}"))
    }

    fn read_unlocked(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let path = self.file_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| LedgerError::csv(&path, e))?;
        let mut records = Vec::new();
        for row in reader.deserialize::<AttendanceRecord>() {
            match row {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(
                    file = %path.display(),
                    error = %err,
                    "skipping unreadable attendance row"
                ),
            }
        }
        Ok(records)
    }
}

fn lookup(records: &[AttendanceRecord], name: &Identity) -> Option<NaiveTime> {
    records.iter().find(|r| &r.name == name).map(|r| r.time)
}

fn parse_file_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_prefix(FILE_PREFIX)?;
    let stem = stem.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use tempfile::tempdir;

    fn identity(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_append_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();

        let record = ledger
            .append(&identity("Alice"), date(2025, 6, 1), time(9, 0, 0))
            .unwrap();
        let records = ledger.read(date(2025, 6, 1)).unwrap();
        assert_eq!(records, vec![record]);
    }

    #[test]
    fn test_second_mark_same_day_is_refused_with_original_time() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();
        let alice = identity("Alice");
        let day = date(2025, 6, 1);

        ledger.append(&alice, day, time(9, 0, 0)).unwrap();
        let err = ledger.append(&alice, day, time(10, 30, 0)).unwrap_err();
        match err {
            LedgerError::DuplicateRecord { time: existing, .. } => {
                assert_eq!(existing, time(9, 0, 0));
            }
            other => panic!("expected DuplicateRecord, got {other:?}"),
        }

        let records = ledger.read(day).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, time(9, 0, 0));
    }

    #[test]
    fn test_read_missing_date_is_empty() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();

        assert!(ledger.read(date(2030, 1, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_two_people_share_a_date() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();
        let day = date(2025, 6, 1);

        ledger.append(&identity("Alice"), day, time(9, 0, 0)).unwrap();
        ledger.append(&identity("Bob"), day, time(9, 5, 0)).unwrap();

        let records = ledger.read(day).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_same_person_across_days_and_dates_listing() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();
        let alice = identity("Alice");

        ledger.append(&alice, date(2025, 6, 1), time(9, 0, 0)).unwrap();
        ledger.append(&alice, date(2025, 6, 2), time(9, 10, 0)).unwrap();

        // Newest first.
        assert_eq!(ledger.dates().unwrap(), vec![date(2025, 6, 2), date(2025, 6, 1)]);
    }

    #[test]
    fn test_concurrent_appends_leave_exactly_one_row() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(AttendanceLedger::open(dir.path()).unwrap());
        let day = date(2025, 6, 1);
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let successes = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                let successes = Arc::clone(&successes);
                std::thread::spawn(move || {
                    barrier.wait();
                    match ledger.append(&identity("Alice"), day, time(9, 0, i as u32)) {
                        Ok(_) => {
                            successes.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(LedgerError::DuplicateRecord { .. }) => {}
                        Err(other) => panic!("unexpected error: {other:?}"),
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.read(day).unwrap().len(), 1);
    }

    #[test]
    fn test_file_naming_and_headers() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();

        ledger
            .append(&identity("Alice"), date(2025, 6, 1), time(9, 0, 0))
            .unwrap();

        let path = dir.path().join("Attendance_2025-06-01.csv");
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Name,Date,Time\n"));
        assert!(content.contains("Alice,2025-06-01,09:00:00"));
    }

    #[test]
    fn test_records_survive_reopen_without_duplicate_headers() {
        let dir = tempdir().unwrap();
        let day = date(2025, 6, 1);
        {
            let ledger = AttendanceLedger::open(dir.path()).unwrap();
            ledger.append(&identity("Alice"), day, time(9, 0, 0)).unwrap();
        }

        let reopened = AttendanceLedger::open(dir.path()).unwrap();
        assert!(reopened.has_recorded(&identity("Alice"), day).unwrap());
        reopened.append(&identity("Bob"), day, time(9, 5, 0)).unwrap();

        let content = fs::read_to_string(dir.path().join("Attendance_2025-06-01.csv")).unwrap();
        assert_eq!(content.matches("Name,Date,Time").count(), 1);
        assert_eq!(reopened.read(day).unwrap().len(), 2);
    }

    #[test]
    fn test_append_into_empty_leftover_file_writes_header() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();
        let day = date(2025, 6, 1);
        // An append interrupted before its first flush leaves an empty
        // file behind.
        fs::write(dir.path().join("Attendance_2025-06-01.csv"), b"").unwrap();

        ledger.append(&identity("Alice"), day, time(9, 0, 0)).unwrap();
        let err = ledger
            .append(&identity("Alice"), day, time(10, 0, 0))
            .unwrap_err();
        match err {
            LedgerError::DuplicateRecord { time: existing, .. } => {
                assert_eq!(existing, time(9, 0, 0));
            }
            other => panic!("expected DuplicateRecord, got {other:?}"),
        }

        let content = fs::read_to_string(dir.path().join("Attendance_2025-06-01.csv")).unwrap();
        assert!(content.starts_with("Name,Date,Time\n"));
        assert_eq!(ledger.read(day).unwrap().len(), 1);
    }

    #[test]
    fn test_unreadable_rows_are_skipped() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();

        fs::write(
            dir.path().join("Attendance_2025-06-01.csv"),
            "Name,Date,Time\nAlice,2025-06-01,09:00:00\nBob,not-a-date,09:05:00\nCara,2025-06-01,09:10:00\n",
        )
        .unwrap();

        let records = ledger.read(date(2025, 6, 1)).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Cara"]);
    }

    #[test]
    fn test_read_range_and_count() {
        let dir = tempdir().unwrap();
        let ledger = AttendanceLedger::open(dir.path()).unwrap();
        let alice = identity("Alice");

        ledger.append(&alice, date(2025, 5, 30), time(9, 0, 0)).unwrap();
        ledger.append(&alice, date(2025, 6, 1), time(9, 0, 0)).unwrap();
        ledger.append(&identity("Bob"), date(2025, 6, 1), time(9, 5, 0)).unwrap();
        ledger.append(&alice, date(2025, 6, 3), time(9, 0, 0)).unwrap();

        let range = ledger.read_range(date(2025, 6, 1), date(2025, 6, 30)).unwrap();
        assert_eq!(range.len(), 3);
        // Oldest date first within a range read.
        assert_eq!(range[0].date, date(2025, 6, 1));

        let attended = ledger
            .count_for(&alice, date(2025, 6, 1), date(2025, 6, 30))
            .unwrap();
        assert_eq!(attended, 2);
    }
}
