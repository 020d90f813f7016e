use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;
use wheel_common::get_current_timestamp;
use wheel_database::Record;

use crate::MigrationError;

/// Writes the rows read from `table` to `<dir>/<table>_<unix-ts>.json`.
pub fn write_snapshot(dir: &Path, table: &str, rows: &[Record]) -> Result<PathBuf, MigrationError> {
    fs::create_dir_all(dir).map_err(|e| MigrationError::io(dir.display().to_string(), e))?;

    let file_path = dir.join(format!("{}_{}.json", table, get_current_timestamp()));
    let content = serde_json::to_string_pretty(rows)?;
    info!(
        "Writing {} rows ({} bytes) of {} to {}",
        rows.len(),
        content.len(),
        table,
        file_path.display()
    );

    let mut file = File::create(&file_path)
        .map_err(|e| MigrationError::io(file_path.display().to_string(), e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| MigrationError::io(file_path.display().to_string(), e))?;

    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_round_trips_rows() {
        let dir = std::env::temp_dir().join(format!("wheel-snapshot-{}", std::process::id()));
        let rows = vec![json!({"id": "c1", "name": "Validate Idea"}).as_object().cloned().unwrap()];

        let path = write_snapshot(&dir, "journey_challenges", &rows).unwrap();
        let written: Vec<Record> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, rows);
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("journey_challenges_"));

        let _ = fs::remove_dir_all(&dir);
    }
}
