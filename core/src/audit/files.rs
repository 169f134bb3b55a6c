use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;

pub const FILE_PREFIX: &str = "orchestra_";
pub const FILE_EXTENSION: &str = "jsonl";

pub fn day_stamp(day: NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}

/// `orchestra_YYYYMMDD.jsonl` for segment 0, `orchestra_YYYYMMDD.N.jsonl` after rotation.
pub fn segment_path(dir: &Path, day: NaiveDate, segment: u32) -> PathBuf {
    let stamp = day_stamp(day);
    if segment == 0 {
        dir.join(format!("{FILE_PREFIX}{stamp}.{FILE_EXTENSION}"))
    } else {
        dir.join(format!("{FILE_PREFIX}{stamp}.{segment}.{FILE_EXTENSION}"))
    }
}

/// Existing segments of one day, oldest first.
pub fn day_segments(dir: &Path, day: NaiveDate) -> Vec<PathBuf> {
    let stamp = day_stamp(day);
    let pattern = format!("{FILE_PREFIX}{stamp}*.{FILE_EXTENSION}");
    let mut segments: Vec<(u32, PathBuf)> = matching_files(dir, &pattern)
        .into_iter()
        .filter_map(|path| segment_index(&path, &stamp).map(|idx| (idx, path)))
        .collect();
    segments.sort_by_key(|(idx, _)| *idx);
    segments.into_iter().map(|(_, path)| path).collect()
}

fn segment_index(path: &Path, stamp: &str) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let rest = name
        .strip_prefix(FILE_PREFIX)?
        .strip_prefix(stamp)?
        .strip_suffix(FILE_EXTENSION)?
        .strip_suffix('.')?;
    if rest.is_empty() {
        return Some(0);
    }
    rest.strip_prefix('.')?.parse().ok()
}

/// Every audit log file in `dir`.
pub fn all_log_files(dir: &Path) -> Vec<PathBuf> {
    matching_files(dir, &format!("{FILE_PREFIX}*.{FILE_EXTENSION}"))
}

fn matching_files(dir: &Path, file_pattern: &str) -> Vec<PathBuf> {
    let dir = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{dir}/{file_pattern}");
    match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_file()).collect(),
        Err(err) => {
            tracing::warn!(pattern = %pattern, error = %err, "invalid log file pattern");
            Vec::new()
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Deletes log files whose modification time is older than `days`. A
/// retention window reaching past the epoch deletes nothing.
pub fn remove_older_than(dir: &Path, days: u64) -> usize {
    let Some(cutoff) = days
        .checked_mul(SECS_PER_DAY)
        .and_then(|secs| SystemTime::now().checked_sub(Duration::from_secs(secs)))
    else {
        return 0;
    };

    let mut removed = 0;
    for path in all_log_files(dir) {
        let Some(mtime) = modified(&path) else {
            continue;
        };
        if mtime >= cutoff {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(file = %path.display(), "deleted old log file");
                removed += 1;
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "failed to delete old log file")
            }
        }
    }
    removed
}

/// Keeps the newest `max_files` log files and deletes the rest.
pub fn keep_newest(dir: &Path, max_files: usize) -> usize {
    let mut files: Vec<(SystemTime, PathBuf)> = all_log_files(dir)
        .into_iter()
        .map(|path| (modified(&path).unwrap_or(SystemTime::UNIX_EPOCH), path))
        .collect();
    if files.len() <= max_files {
        return 0;
    }

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    let mut removed = 0;
    for (_, path) in files.into_iter().skip(max_files) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "failed to prune log file")
            }
        }
    }
    removed
}
