// src/sheets/persistence/backup.rs
use bevy::log::info;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use super::csv_store;
use crate::sheets::error::PersistenceError;
use crate::sheets::sheet::Sheet;

const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S";

/// `jobs.csv` at 2024-05-01 10:00:00 -> `jobs_20240501_100000.csv`.
pub fn backup_path(data_path: &Path, at: DateTime<Local>) -> PathBuf {
    let stem = data_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sheet".to_string());
    data_path.with_file_name(format!("{}_{}.csv", stem, at.format(BACKUP_STAMP)))
}

/// Writes a timestamped CSV copy of the sheet next to `data_path`.
pub fn write_backup(data_path: &Path, sheet: &Sheet) -> Result<PathBuf, PersistenceError> {
    let target = backup_path(data_path, Local::now());
    csv_store::write_table(&target, sheet)?;
    info!("Backup written to {:?}.", target);
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn backup_name_carries_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(
            backup_path(Path::new("/data/jobs.csv"), at),
            PathBuf::from("/data/jobs_20240501_100000.csv")
        );
    }
}
