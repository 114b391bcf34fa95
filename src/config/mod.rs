// ==========================================
// Precast tracking backend - configuration layer
// ==========================================
// Import tuning: config_kv table with defaults
// Process settings: environment variables
// ==========================================

pub mod import_config;
pub mod server_config;

pub use import_config::{config_keys, ImportConfig};
pub use server_config::ServerConfig;
