//! Miscellaneous utilities: PID file, snapshot files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::warn;

// ── PID file ──────────────────────────────────────────────────────────────────

/// Write the current process PID to `path`.
pub fn write_pid_file(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::File::create(path)?;
    writeln!(f, "{}", std::process::id())?;
    Ok(())
}

/// Remove the PID file (best-effort, logs a warning on failure).
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("failed to remove PID file {}: {e}", path.display());
    }
}

// ── Snapshots ─────────────────────────────────────────────────────────────────

/// Directory name for a camera host: "192.168.1.64" → "192_168_1_64".
pub fn host_dir_name(host: &str) -> String {
    host.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Store a JPEG under `<dir>/<host>/<timestamp>.jpg`.
pub async fn save_snapshot(dir: &Path, host: &str, jpeg: &[u8]) -> io::Result<PathBuf> {
    let dir = dir.join(host_dir_name(host));
    tokio::fs::create_dir_all(&dir).await?;
    let ts = chrono::Local::now().format("%Y%m%d%H%M%S%3f").to_string();
    let path = dir.join(format!("{ts}.jpg"));
    tokio::fs::write(&path, jpeg).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/hik.pid");
        write_pid_file(&path).unwrap();
        let pid: u32 = fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
        remove_pid_file(&path);
        assert!(!path.exists());
    }

    #[test]
    fn host_dir_is_filesystem_safe() {
        assert_eq!(host_dir_name("192.168.1.64"), "192_168_1_64");
        assert_eq!(host_dir_name("fe80::1"), "fe80__1");
        assert_eq!(host_dir_name("cam-01.lan"), "cam-01_lan");
    }

    #[tokio::test]
    async fn snapshot_lands_under_host_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_snapshot(dir.path(), "10.0.0.2", &[0xff, 0xd8, 0xff, 0xd9]).await.unwrap();
        assert!(path.starts_with(dir.path().join("10_0_0_2")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(fs::read(&path).unwrap(), vec![0xff, 0xd8, 0xff, 0xd9]);
    }
}
