use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::vecmath::Vec2;

/// Reads particle positions from a snapshot file.
///
/// Each data line carries three whitespace-separated floats `x y z`; only x
/// and y are used here. Comment (`#`) and blank lines are skipped, and so is
/// any line that does not parse as three floats — malformed lines are not an
/// error. An empty result is valid.
pub fn read_positions(path: &Path) -> Result<Vec<Vec2>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open snapshot '{}'", path.display()))?;
    let reader = BufReader::new(file);

    let mut positions = Vec::new();
    for line in reader.lines() {
        let line = line
            .with_context(|| format!("read error in snapshot '{}'", path.display()))?;
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let parsed = (
            fields.next().and_then(|s| s.parse::<f64>().ok()),
            fields.next().and_then(|s| s.parse::<f64>().ok()),
            fields.next().and_then(|s| s.parse::<f64>().ok()),
        );
        if let (Some(x), Some(y), Some(_z)) = parsed {
            positions.push(Vec2::new(x, y));
        }
    }
    Ok(positions)
}

/// Extracts the time index from a file name of the form `time_<idx>.dat`.
pub fn extract_time_index(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("time_")?
        .strip_suffix(".dat")?
        .parse()
        .ok()
}

/// Finds the snapshot files in `data_dir` whose time index falls inside
/// `[start_index, end_index]`, sorted ascending by index with a lexical
/// tie-break. Files that do not match the `time_<idx>.dat` pattern are
/// ignored. An empty result is not an error here; the driver decides.
pub fn discover_snapshots(
    data_dir: &Path,
    start_index: u32,
    end_index: u32,
) -> Result<Vec<(u32, PathBuf)>> {
    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("cannot read snapshot directory '{}'", data_dir.display()))?;

    let mut selected = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("error listing '{}'", data_dir.display()))?;
        let path = entry.path();
        if let Some(idx) = extract_time_index(&path) {
            if idx >= start_index && idx <= end_index {
                selected.push((idx, path));
            }
        }
    }

    selected.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    #[test]
    fn parses_xy_and_skips_malformed_lines() {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(f, "# header comment").unwrap();
        writeln!(f, "1.0 2.0 0.0").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "not a number line").unwrap();
        writeln!(f, "3.5 4.5").unwrap(); // only two columns: malformed
        writeln!(f, "  5.0\t6.0 1.0").unwrap();
        f.flush().unwrap();

        let positions = read_positions(f.path()).expect("readable snapshot");
        assert_eq!(positions.len(), 2);
        assert_abs_diff_eq!(positions[0].x, 1.0);
        assert_abs_diff_eq!(positions[0].y, 2.0);
        assert_abs_diff_eq!(positions[1].x, 5.0);
        assert_abs_diff_eq!(positions[1].y, 6.0);
    }

    #[test]
    fn empty_file_is_a_valid_empty_snapshot() {
        let f = tempfile::NamedTempFile::new().expect("temp file");
        let positions = read_positions(f.path()).expect("empty snapshot");
        assert!(positions.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_positions(Path::new("/nonexistent/time_1.dat")).is_err());
    }

    #[test]
    fn extracts_time_indices() {
        assert_eq!(extract_time_index(Path::new("/a/b/time_123.dat")), Some(123));
        assert_eq!(extract_time_index(Path::new("time_0.dat")), Some(0));
        assert_eq!(extract_time_index(Path::new("time_x.dat")), None);
        assert_eq!(extract_time_index(Path::new("positions.dat")), None);
        assert_eq!(extract_time_index(Path::new("time_5.txt")), None);
    }

    #[test]
    fn discovery_filters_by_range_and_sorts_numerically() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["time_10.dat", "time_2.dat", "time_1.dat", "time_500.dat", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let found = discover_snapshots(dir.path(), 1, 100).expect("readable dir");
        let indices: Vec<u32> = found.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 10]);
    }

    #[test]
    fn discovery_of_missing_directory_is_an_error() {
        assert!(discover_snapshots(Path::new("/nonexistent-dir"), 0, 10).is_err());
    }
}
