use std::net::SocketAddr;
use std::time::Duration;

use envconfig::Envconfig;
use thiserror::Error;

/// Startup configuration errors. In lax mode a missing endpoint only
/// downgrades the affected component; in strict mode it aborts startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    MissingSetting(&'static str),
}

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    #[envconfig(default = "development")]
    pub environment: String,

    pub redis_url: Option<String>,

    pub database_url: Option<String>,

    #[envconfig(default = "/mnt/shared/static")]
    pub shared_storage_path: String,

    #[envconfig(default = "./static")]
    pub local_storage_path: String,

    #[envconfig(default = "component-checker-secret")]
    pub session_secret: String,

    #[envconfig(default = "5")]
    pub connect_timeout_seconds: u64,

    #[envconfig(default = "5")]
    pub max_pg_connections: u32,

    #[envconfig(default = "false")]
    pub strict_config: bool,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}
