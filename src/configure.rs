use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "config/reqmux";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub engine: EngineConfig,
    pub driver: DriverConfig,
}

/// Settings for the reqwest-backed transfer engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Tokio worker threads driving the transfers
    pub worker_threads: usize,
    pub connect_timeout_ms: u64,
    /// Applied to requests that carry no timeout of their own (0 = none)
    pub default_timeout_ms: u64,
    pub user_agent: String,
    /// Honour HTTP_PROXY / HTTPS_PROXY / NO_PROXY from the environment
    pub use_system_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Pause between two `update` calls of the driver thread
    pub update_interval_ms: u64,
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_ms(self.connect_timeout_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        non_zero_ms(self.default_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            connect_timeout_ms: 10_000,
            default_timeout_ms: 0,
            user_agent: concat!("reqmux/", env!("CARGO_PKG_VERSION")).to_string(),
            use_system_proxy: true,
        }
    }
}

impl DriverConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { update_interval_ms: 5 }
    }
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(None)
}

/// Load configuration from defaults, an optional file and `REQMUX_*` env vars.
///
/// An explicit `path` must exist; the default file is optional.
pub fn load_config_from(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let engine = EngineConfig::default();
    let driver = DriverConfig::default();

    let file = match path {
        Some(path) => File::with_name(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let s = Config::builder()
        // Set defaults
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/reqmux.log")?
        .set_default("engine.worker_threads", engine.worker_threads as u64)?
        .set_default("engine.connect_timeout_ms", engine.connect_timeout_ms)?
        .set_default("engine.default_timeout_ms", engine.default_timeout_ms)?
        .set_default("engine.user_agent", engine.user_agent)?
        .set_default("engine.use_system_proxy", engine.use_system_proxy)?
        .set_default("driver.update_interval_ms", driver.update_interval_ms)?
        .add_source(file)
        // e.g. REQMUX_ENGINE__WORKER_THREADS=4
        .add_source(Environment::with_prefix("REQMUX").prefix_separator("_").separator("__"))
        .build()?;

    s.try_deserialize()
}
