//! Durable journal of stored observations.
//!
//! Uses JSON Lines format (.jsonl):
//! - Each line is one complete `ObservationRow`
//! - Files rotate by the observation's UTC date (`observations_YYYY-MM-DD.jsonl`)
//! - Append mode only; each line goes to the file in a single write, and a
//!   failed write is truncated away so it never merges with the next line

use crate::error::{StoreError, StoreResult};
use crate::row::ObservationRow;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "observations_";
const FILE_SUFFIX: &str = ".jsonl";

/// Persistence interface behind the history store.
///
/// `record` must be atomic per row from the store's point of view: when it
/// returns an error the row is treated as not written.
#[cfg_attr(test, mockall::automock)]
pub trait ObservationJournal: Send + Sync {
    fn record(&self, row: &ObservationRow) -> StoreResult<()>;

    /// Drop persisted rows observed before `cutoff`. Returns rows or files removed.
    fn prune_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;
}

/// Open day file.
///
/// Unbuffered: a row is either fully handed to the OS or rolled back.
struct ActiveFile {
    file: File,
    date: NaiveDate,
    records_written: usize,
}

/// Day-rotated JSON Lines journal.
pub struct JsonLinesJournal {
    base_dir: PathBuf,
    active: Mutex<Option<ActiveFile>>,
}

impl JsonLinesJournal {
    /// Open a journal rooted at `base_dir`, creating the directory.
    pub fn open(base_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        info!(dir = %base_dir.display(), "Opened observation journal");
        Ok(Self {
            base_dir,
            active: Mutex::new(None),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.base_dir
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format("%Y-%m-%d")))
    }

    /// Journal files present on disk, oldest first.
    pub fn files(&self) -> StoreResult<Vec<(NaiveDate, PathBuf)>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if let Some(date) = file_date(&path) {
                files.push((date, path));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read back every row, skipping lines that do not parse.
    ///
    /// Rows observed before `cutoff` are left out.
    pub fn replay(&self, cutoff: Option<DateTime<Utc>>) -> StoreResult<Vec<ObservationRow>> {
        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for (_, path) in self.files()? {
            let reader = BufReader::new(File::open(&path)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ObservationRow>(&line) {
                    Ok(row) if cutoff.map_or(true, |c| row.observed_at >= c) => rows.push(row),
                    Ok(_) => {}
                    Err(e) => {
                        skipped += 1;
                        warn!(file = %path.display(), line = line_no + 1, ?e, "Skipping unreadable journal line");
                    }
                }
            }
        }

        info!(rows = rows.len(), skipped, "Replayed observation journal");
        Ok(rows)
    }

    /// Flush and close the open day file.
    pub fn close(&self) -> StoreResult<()> {
        if let Some(active) = self.active.lock().take() {
            active.file.sync_data()?;
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed JSON Lines journal file"
            );
        }
        Ok(())
    }

    fn open_day(&self, date: NaiveDate) -> StoreResult<ActiveFile> {
        let path = self.path_for(date);
        debug!(path = %path.display(), "Opening journal file (append mode)");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(ActiveFile {
            file,
            date,
            records_written: 0,
        })
    }
}

impl ObservationJournal for JsonLinesJournal {
    fn record(&self, row: &ObservationRow) -> StoreResult<()> {
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        let date = row.observed_at.date_naive();

        let mut guard = self.active.lock();
        if guard.as_ref().map_or(true, |active| active.date != date) {
            *guard = None;
            *guard = Some(self.open_day(date)?);
        }
        let active = guard
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("journal file not open".to_string()))?;

        let written = active
            .file
            .metadata()
            .map_err(StoreError::from)
            .and_then(|meta| append_line(&mut active.file, meta.len(), &line));
        match written {
            Ok(()) => {
                active.records_written += 1;
                Ok(())
            }
            Err(e) => {
                // Reopen on the next record rather than reuse a file in an unknown state
                *guard = None;
                Err(e)
            }
        }
    }

    /// Removes whole day files dated before the cutoff's day.
    ///
    /// The file for the cutoff day itself may still hold older rows;
    /// `replay` filters those by the same cutoff.
    fn prune_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let cutoff_date = cutoff.date_naive();
        let mut guard = self.active.lock();
        if guard.as_ref().is_some_and(|active| active.date < cutoff_date) {
            *guard = None;
        }

        let mut removed = 0;
        for (date, path) in self.files()? {
            if date >= cutoff_date {
                break;
            }
            std::fs::remove_file(&path)?;
            removed += 1;
            debug!(path = %path.display(), "Removed expired journal file");
        }
        if removed > 0 {
            info!(removed, cutoff = %cutoff_date, "Pruned journal files");
        }
        Ok(removed)
    }
}

impl Drop for JsonLinesJournal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(?e, "Failed to close journal on drop");
        }
    }
}

/// Write one line; on failure cut the file back to `len` so no partial line remains.
fn append_line(file: &mut File, len: u64, line: &[u8]) -> StoreResult<()> {
    if let Err(e) = file.write_all(line) {
        if let Err(truncate) = file.set_len(len) {
            warn!(?truncate, "Failed to roll back partial journal line");
        }
        return Err(e.into());
    }
    Ok(())
}

fn file_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fundrate_core::Exchange;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn make_row(day: u32, hour: u32, sequence: u64) -> ObservationRow {
        let at = Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap();
        ObservationRow {
            exchange: Exchange::Binance,
            instrument: "BTCUSDT".to_string(),
            rate: dec!(0.0001),
            settlement_interval_hours: 8,
            observed_at: at,
            collected_at: at,
            sequence,
            next_funding_at: None,
        }
    }

    #[test]
    fn test_write_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();

        for i in 0..5 {
            journal.record(&make_row(1, i, u64::from(i) + 1)).unwrap();
        }
        journal.close().unwrap();

        let files = journal.files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].1.ends_with("observations_2024-03-01.jsonl"));

        let rows = journal.replay(None).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], make_row(1, 0, 1));
    }

    #[test]
    fn test_rotates_by_observation_date() {
        let temp_dir = TempDir::new().unwrap();
        let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();

        journal.record(&make_row(1, 23, 1)).unwrap();
        journal.record(&make_row(2, 0, 2)).unwrap();
        // Late arrival for the previous day reopens its file in append mode
        journal.record(&make_row(1, 22, 3)).unwrap();
        journal.close().unwrap();

        let files = journal.files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(journal.replay(None).unwrap().len(), 3);
    }

    #[test]
    fn test_append_mode_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        {
            let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();
            journal.record(&make_row(1, 0, 1)).unwrap();
        }
        {
            let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();
            journal.record(&make_row(1, 1, 2)).unwrap();
        }
        let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();
        assert_eq!(journal.replay(None).unwrap().len(), 2);
    }

    #[test]
    fn test_replay_skips_corrupt_lines_and_applies_cutoff() {
        let temp_dir = TempDir::new().unwrap();
        let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();
        journal.record(&make_row(1, 0, 1)).unwrap();
        journal.record(&make_row(1, 12, 2)).unwrap();
        journal.close().unwrap();

        let path = temp_dir.path().join("observations_2024-03-01.jsonl");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"exchange\":\"binance\",\"instr").unwrap();

        assert_eq!(journal.replay(None).unwrap().len(), 2);

        let cutoff = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let rows = journal.replay(Some(cutoff)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence, 2);
    }

    #[test]
    fn test_prune_removes_whole_days_before_cutoff() {
        let temp_dir = TempDir::new().unwrap();
        let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();
        for day in 1..=4 {
            journal.record(&make_row(day, 0, u64::from(day))).unwrap();
        }

        let cutoff = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        assert_eq!(journal.prune_before(cutoff).unwrap(), 2);

        let remaining: Vec<_> = journal.files().unwrap().into_iter().map(|(d, _)| d).collect();
        assert_eq!(
            remaining,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_leaves_no_trace() {
        let temp_dir = TempDir::new().unwrap();
        let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();
        let day1 = temp_dir.path().join("observations_2024-03-01.jsonl");
        std::os::unix::fs::symlink("/dev/full", &day1).unwrap();

        assert!(journal.record(&make_row(1, 0, 1)).is_err());
        // A healthy day file is not blamed for the earlier failure
        journal.record(&make_row(2, 0, 1)).unwrap();

        std::fs::remove_file(&day1).unwrap();
        journal.record(&make_row(1, 1, 1)).unwrap();
        journal.close().unwrap();

        let rows = journal.replay(None).unwrap();
        assert_eq!(rows, vec![make_row(1, 1, 1), make_row(2, 0, 1)]);
        let text = std::fs::read_to_string(&day1).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_ignores_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(temp_dir.path().join("observations_latest.jsonl"), "{}").unwrap();
        let journal = JsonLinesJournal::open(temp_dir.path()).unwrap();
        assert!(journal.files().unwrap().is_empty());
        assert!(journal.replay(None).unwrap().is_empty());
    }
}
