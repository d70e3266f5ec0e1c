//! `lanexfer status` – show saved progress of an interrupted transfer.

use anyhow::{Context, Result};
use lanexfer_core::config::XferConfig;
use lanexfer_core::saver::{read_record, SidecarExtensions};
use lanexfer_core::storage::sibling_path;
use std::path::Path;

pub fn run_status(cfg: &XferConfig, dest: &Path) -> Result<()> {
    let ext = cfg.extensions.clone().unwrap_or_default();
    for line in status_lines(dest, &ext)? {
        println!("{line}");
    }
    Ok(())
}

fn status_lines(dest: &Path, ext: &SidecarExtensions) -> Result<Vec<String>> {
    let info = sibling_path(dest, &ext.info);
    let lock = sibling_path(dest, &ext.lock);
    let record = read_record(&info).with_context(|| format!("reading {}", info.display()))?;
    let mut out = Vec::new();
    let lock_line = lock.exists().then(|| {
        format!(
            "{:<10} {} present (another copy is running, or one was killed; remove it to resume)",
            "LOCK",
            lock.display()
        )
    });

    let Some(record) = record else {
        if dest.exists() {
            out.push(format!("{}: complete (no saved progress)", dest.display()));
        } else {
            out.push(format!("{}: no transfer in progress", dest.display()));
        }
        out.extend(lock_line);
        return Ok(out);
    };

    let size_str = record
        .size()
        .map(|s| format!("{s}"))
        .unwrap_or_else(|| "?".to_string());
    let pct = match record.size() {
        Some(0) => 100.0,
        Some(n) => record.written_bytes as f64 * 100.0 / n as f64,
        None => 0.0,
    };
    out.push(format!("{:<10} {}", "DEST", dest.display()));
    out.push(format!("{:<10} {}", "TEMP", record.temp_file_name));
    out.push(format!(
        "{:<10} {} / {} bytes ({:.1}%)",
        "WRITTEN", record.written_bytes, size_str, pct
    ));
    out.push(format!(
        "{:<10} {}",
        "CHECKSUM",
        if record.checksum.is_empty() { "-" } else { record.checksum.as_str() }
    ));
    out.extend(lock_line);
    let remaining = record.store_index.ranges();
    out.push(format!("{:<10} {} range(s)", "PENDING", remaining.len()));
    for r in remaining {
        let end = r.end.map(|e| e.to_string()).unwrap_or_else(|| "end".to_string());
        out.push(format!("  [{}, {})", r.start, end));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanexfer_core::{Saver, SaverOptions};

    fn has_lock_line(lines: &[String]) -> bool {
        lines.iter().any(|l| l.starts_with("LOCK"))
    }

    #[test]
    fn reports_lock_while_saver_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let ext = SidecarExtensions::default();
        let saver = Saver::create(
            &dest,
            SaverOptions {
                expected_size: Some(100),
                ..SaverOptions::default()
            },
        )
        .unwrap();

        let lines = status_lines(&dest, &ext).unwrap();
        assert!(has_lock_line(&lines), "{lines:?}");
        assert!(lines.iter().any(|l| l.starts_with("WRITTEN") && l.contains("0 / 100")));

        saver.close().unwrap();
        let lines = status_lines(&dest, &ext).unwrap();
        assert!(!has_lock_line(&lines), "{lines:?}");
        assert!(lines.iter().any(|l| l.starts_with("PENDING") && l.contains("1 range")));
    }

    #[test]
    fn stale_lock_without_sidecar_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(dir.path().join("out.bin.lock"), b"").unwrap();

        let lines = status_lines(&dest, &SidecarExtensions::default()).unwrap();
        assert_eq!(lines[0], format!("{}: no transfer in progress", dest.display()));
        assert!(has_lock_line(&lines));
    }
}
