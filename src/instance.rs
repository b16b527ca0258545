//! Single-instance bookkeeping.
//!
//! A running server records its PID, workspace and address in a JSON file
//! under the temp directory. `status` and `kill` read it back; a record
//! whose process is gone is treated as stale and removed.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub pid: u32,
    pub workspace: String,
    pub addr: String,
}

impl InstanceInfo {
    pub fn current(workspace: &Path, addr: &str) -> Self {
        Self {
            pid: std::process::id(),
            workspace: workspace.to_string_lossy().to_string(),
            addr: addr.to_string(),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        // Signal 0 only checks that the process exists
        unsafe { libc::kill(self.pid as libc::pid_t, 0) == 0 }
    }

    #[cfg(windows)]
    pub fn is_alive(&self) -> bool {
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", self.pid), "/NH"])
            .output()
            .map(|out| String::from_utf8_lossy(&out.stdout).contains(&self.pid.to_string()))
            .unwrap_or(false)
    }

    #[cfg(unix)]
    pub fn stop(&self) -> bool {
        unsafe { libc::kill(self.pid as libc::pid_t, libc::SIGTERM) == 0 }
    }

    #[cfg(windows)]
    pub fn stop(&self) -> bool {
        std::process::Command::new("taskkill")
            .args(["/PID", &self.pid.to_string(), "/F"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Location of the PID record.
pub struct InstanceFile {
    path: PathBuf,
}

impl Default for InstanceFile {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join("workspace-sync.pid"),
        }
    }
}

impl InstanceFile {
    #[cfg(test)]
    fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn read(&self) -> Option<InstanceInfo> {
        let contents = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn write(&self, info: &InstanceInfo) -> anyhow::Result<()> {
        fs::write(&self.path, serde_json::to_string(info)?)?;
        Ok(())
    }

    pub fn clear(&self) {
        let _ = fs::remove_file(&self.path);
    }

    /// The recorded instance if its process is still alive. Stale records
    /// are removed.
    pub fn running(&self) -> Option<InstanceInfo> {
        let info = self.read()?;
        if info.is_alive() {
            Some(info)
        } else {
            self.clear();
            None
        }
    }
}

pub fn print_status(file: &InstanceFile) {
    match file.running() {
        Some(info) => {
            println!("✓ workspace-sync is running");
            println!("  PID:       {}", info.pid);
            println!("  Workspace: {}", info.workspace);
            println!("  URL:       {}", info.url());
        }
        None => println!("✗ workspace-sync is not running"),
    }
}

pub fn stop_running(file: &InstanceFile) {
    match file.running() {
        Some(info) if info.stop() => {
            println!("✓ Stopped workspace-sync (PID {})", info.pid);
            file.clear();
        }
        Some(info) => println!("✗ Failed to stop workspace-sync (PID {})", info.pid),
        None => println!("✗ workspace-sync is not running"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_current_process_is_running() {
        let dir = TempDir::new().unwrap();
        let file = InstanceFile::at(dir.path().join("ws.pid"));
        let info = InstanceInfo::current(Path::new("/srv/ws"), "127.0.0.1:5000");
        file.write(&info).unwrap();

        assert_eq!(file.running(), Some(info.clone()));
        assert_eq!(info.url(), "http://127.0.0.1:5000");
    }

    #[test]
    fn test_missing_or_garbled_record() {
        let dir = TempDir::new().unwrap();
        let file = InstanceFile::at(dir.path().join("ws.pid"));
        assert!(file.running().is_none());

        fs::write(dir.path().join("ws.pid"), "not json").unwrap();
        assert!(file.read().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_record_is_cleared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ws.pid");
        let file = InstanceFile::at(path.clone());

        // Reap a short-lived child so its pid is known to be dead
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        file.write(&InstanceInfo {
            pid,
            workspace: "/tmp/ws".to_string(),
            addr: "127.0.0.1:1".to_string(),
        })
        .unwrap();

        assert!(file.running().is_none());
        assert!(!path.exists());
    }
}
