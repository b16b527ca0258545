//! Runtime configuration, assembled from the command line in `main`.

use std::path::PathBuf;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Workspace root; created on startup if missing
    pub workspace: PathBuf,
    pub host: String,
    pub port: u16,
    /// Hard limit for a single `/api/execute` call
    pub command_timeout: Duration,
    /// Largest single uploaded file, and largest decompressed archive entry
    pub max_file_bytes: u64,
    /// Everything one upload may write once archives are expanded
    pub max_upload_bytes: u64,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_file_mib(&self) -> u64 {
        self.max_file_bytes / MIB
    }

    pub fn with_max_file_mib(mut self, mib: u64) -> Self {
        self.max_file_bytes = mib.saturating_mul(MIB);
        self
    }

    pub fn max_upload_mib(&self) -> u64 {
        self.max_upload_bytes / MIB
    }

    pub fn with_max_upload_mib(mut self, mib: u64) -> Self {
        self.max_upload_bytes = mib.saturating_mul(MIB);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("uploads"),
            host: "127.0.0.1".to_string(),
            port: 5000,
            command_timeout: Duration::from_secs(60),
            max_file_bytes: 100 * MIB,
            max_upload_bytes: 1024 * MIB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_client_expectations() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:5000");
        assert_eq!(config.max_file_mib(), 100);
        assert_eq!(config.command_timeout, Duration::from_secs(60));
        assert_eq!(config.max_upload_mib(), 1024);
    }

    #[test]
    fn test_file_limit_in_mib() {
        let config = ServerConfig::default().with_max_file_mib(5);
        assert_eq!(config.max_file_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_file_mib(), 5);

        let config = config.with_max_upload_mib(20);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.max_file_bytes, 5 * 1024 * 1024);
    }
}
