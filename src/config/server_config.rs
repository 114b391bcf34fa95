// ==========================================
// Precast tracking backend - process configuration
// ==========================================
// Read from the environment; paths default to the platform data dir.
// ==========================================

use std::net::SocketAddr;
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "PRECAST_DB_PATH";
pub const ENV_BIND_ADDR: &str = "PRECAST_BIND_ADDR";
pub const ENV_UPLOAD_DIR: &str = "PRECAST_UPLOAD_DIR";

const APP_DIR: &str = "precast-import";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: String,
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path = match std::env::var(ENV_DB_PATH) {
            Ok(path) if !path.trim().is_empty() => path,
            _ => default_db_path(),
        };

        let bind_raw =
            std::env::var(ENV_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", ENV_BIND_ADDR, bind_raw, e))?;

        let upload_dir = match std::env::var(ENV_UPLOAD_DIR) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => app_data_dir().join("uploads"),
        };

        Ok(Self {
            db_path,
            bind_addr,
            upload_dir,
        })
    }
}

fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `<data_dir>/precast-import/precast.db`
pub fn default_db_path() -> String {
    app_data_dir().join("precast.db").to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_db_path_is_under_app_dir() {
        let path = default_db_path();
        assert!(path.ends_with("precast.db"));
        assert!(path.contains(APP_DIR));
    }
}
