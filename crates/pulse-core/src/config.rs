use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18620;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (pulse.toml + PULSE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            runner: RunnerConfig::default(),
            feed: FeedConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token required on admin routes. `None` disables auth — use
    /// only on trusted networks.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Job runner knobs — poll cadence, in-flight ceiling, per-handler timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
            max_concurrent: default_max_concurrent(),
            handler_timeout_secs: default_handler_timeout_secs(),
        }
    }
}

/// Upstream feed the digest payload is fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_feed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            timeout_secs: default_feed_timeout_secs(),
        }
    }
}

/// One named fixed-window policy: at most `max_requests` per `window_ms`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitPolicyConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

/// Static policy table for the limiter registry. Set once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Read-only admin routes, keyed by client IP.
    #[serde(default = "default_api_limit")]
    pub api: LimitPolicyConfig,
    /// Schedule/cancel/run-now mutations, keyed by subscriber.
    #[serde(default = "default_schedule_limit")]
    pub schedule: LimitPolicyConfig,
    /// Outbound webhook deliveries, keyed by subscriber.
    #[serde(default = "default_delivery_limit")]
    pub delivery: LimitPolicyConfig,
    /// How often stale window entries are swept, in seconds.
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            api: default_api_limit(),
            schedule: default_schedule_limit(),
            delivery: default_delivery_limit(),
            sweep_secs: default_sweep_secs(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pulse/pulse.db", home)
}
fn default_poll_secs() -> u64 {
    10
}
fn default_max_concurrent() -> usize {
    20
}
fn default_handler_timeout_secs() -> u64 {
    30
}
fn default_feed_url() -> String {
    "http://localhost:8080/digest".to_string()
}
fn default_feed_timeout_secs() -> u64 {
    10
}
fn default_api_limit() -> LimitPolicyConfig {
    LimitPolicyConfig {
        max_requests: 60,
        window_ms: 60_000,
    }
}
fn default_schedule_limit() -> LimitPolicyConfig {
    LimitPolicyConfig {
        max_requests: 10,
        window_ms: 60_000,
    }
}
fn default_delivery_limit() -> LimitPolicyConfig {
    LimitPolicyConfig {
        max_requests: 30,
        window_ms: 60_000,
    }
}
fn default_sweep_secs() -> u64 {
    60
}

impl PulseConfig {
    /// Load config from a TOML file with PULSE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.pulse/pulse.toml
    ///
    /// Env overrides nest on double underscores, keeping snake_case fields
    /// addressable: `PULSE_GATEWAY__PORT`, `PULSE_RUNNER__POLL_SECS`,
    /// `PULSE_LIMITS__API__MAX_REQUESTS`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PulseConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PULSE_").split("__"))
            .extract()
            .map_err(|e| crate::error::PulseError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pulse/pulse.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PulseConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert_eq!(cfg.runner.poll_secs, 10);
        assert_eq!(cfg.runner.max_concurrent, 20);
        assert_eq!(cfg.limits.schedule.max_requests, 10);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = PulseConfig::load(Some("/nonexistent/pulse.toml")).unwrap();
        assert_eq!(cfg.gateway.bind, DEFAULT_BIND);
        assert_eq!(cfg.limits.api.window_ms, 60_000);
    }

    #[test]
    fn env_overrides_reach_snake_case_fields() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PULSE_GATEWAY__PORT", "9999");
            jail.set_env("PULSE_RUNNER__POLL_SECS", "3");
            jail.set_env("PULSE_LIMITS__API__MAX_REQUESTS", "7");

            let cfg = PulseConfig::load(Some("/nonexistent/pulse.toml")).unwrap();
            assert_eq!(cfg.gateway.port, 9999);
            assert_eq!(cfg.runner.poll_secs, 3);
            assert_eq!(cfg.limits.api.max_requests, 7);
            Ok(())
        });
    }
}
