//! Service configuration.
//!
//! Every setting has a default and can be overridden by an environment
//! variable (a `.env` file is loaded by the binary before this runs).

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Default byte-range window served per partial-content response.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000_000;

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// External analysis-worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Program used to run analysis scripts.
    pub interpreter: String,
    /// Directory the script names are resolved against.
    pub script_dir: PathBuf,
    /// Maximum number of worker processes running at once.
    pub max_concurrent: usize,
    /// A worker still running after this long is killed.
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            script_dir: PathBuf::from("python_computer_vision"),
            max_concurrent: 2,
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    /// Root directory under which every artifact directory lives.
    pub storage_root: PathBuf,
    /// Size of one range window in bytes.
    pub chunk_size: u64,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            worker: WorkerConfig::default(),
            storage_root: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_dir: PathBuf::from("logs"),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`, `API_ENABLE_CORS`
    /// - `STORAGE_ROOT`, `STREAM_CHUNK_SIZE`, `LOG_DIR`
    /// - `WORKER_INTERPRETER`, `WORKER_SCRIPT_DIR`,
    ///   `MAX_CONCURRENT_WORKERS`, `WORKER_TIMEOUT_SECS`
    pub fn from_env_or_default() -> Result<Self> {
        let mut config = Self::default();

        if let Some(bind_address) = env_string("API_BIND_ADDRESS") {
            config.server.bind_address = bind_address;
        }
        if let Some(port) = env_parsed("API_PORT") {
            config.server.port = port;
        }
        if let Some(enable_cors) = env_parsed("API_ENABLE_CORS") {
            config.server.enable_cors = enable_cors;
        }

        if let Some(root) = env_string("STORAGE_ROOT") {
            config.storage_root = PathBuf::from(root);
        }
        if let Some(chunk_size) = env_parsed("STREAM_CHUNK_SIZE") {
            config.chunk_size = chunk_size;
        }
        if let Some(log_dir) = env_string("LOG_DIR") {
            config.log_dir = PathBuf::from(log_dir);
        }

        if let Some(interpreter) = env_string("WORKER_INTERPRETER") {
            config.worker.interpreter = interpreter;
        }
        if let Some(script_dir) = env_string("WORKER_SCRIPT_DIR") {
            config.worker.script_dir = PathBuf::from(script_dir);
        }
        if let Some(max) = env_parsed("MAX_CONCURRENT_WORKERS") {
            config.worker.max_concurrent = max;
        }
        if let Some(secs) = env_parsed::<u64>("WORKER_TIMEOUT_SECS") {
            config.worker.timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker.max_concurrent == 0 {
            return Err(Error::config("MAX_CONCURRENT_WORKERS must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(Error::config("STREAM_CHUNK_SIZE must be at least 1"));
        }
        if self.worker.timeout.is_zero() {
            return Err(Error::config("WORKER_TIMEOUT_SECS must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chunk_size, 1_000_000);
        assert_eq!(config.worker.interpreter, "python");
        assert_eq!(config.worker.max_concurrent, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = AppConfig::default();
        config.worker.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let config = AppConfig {
            chunk_size: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
