use crate::error::EngineError;
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// A handful of top-level flags that make sense on a command line; everything
/// else is resolved through [`Config::load`]'s env/TOML layering.
#[derive(Debug, Parser)]
#[command(name = "kalshi-signal-engine", about = "Binary-market data and signal engine")]
pub struct Cli {
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "BIND_ADDR")]
    pub bind_addr: Option<String>,

    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Resolved configuration for one process run.
///
/// Resolution order, each layer overriding the last: compiled-in defaults,
/// an optional TOML file, then process environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub rest_base_url: String,
    pub stream_url: String,
    pub api_key_id: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub order_book_auth_required: bool,

    pub rest_poll_interval_secs: u64,
    pub rate_limit_per_second: u32,
    pub stream_reconnect_base_secs: u64,

    pub signal_interval_secs: u64,
    pub drift_window_secs: u64,
    pub drift_threshold: f64,
    pub imbalance_threshold: f64,
    pub volume_surge_threshold: f64,
    pub volume_window_secs: u64,

    pub bind_addr: String,
    pub cors_allowed_origins: Vec<String>,

    pub alerting_enabled: bool,
    pub webhook_urls: Vec<String>,
    pub alert_cooldown_secs: u64,

    pub trade_ring_capacity: usize,
    pub snapshot_ring_capacity: usize,

    pub log_level: String,
}

/// Shape of the optional TOML overlay file; every field is optional so a
/// partial file only overrides what it mentions.
#[derive(Debug, Default, Deserialize)]
struct TomlOverlay {
    rest_base_url: Option<String>,
    stream_url: Option<String>,
    api_key_id: Option<String>,
    private_key_path: Option<String>,
    order_book_auth_required: Option<bool>,
    rest_poll_interval_secs: Option<u64>,
    rate_limit_per_second: Option<u32>,
    stream_reconnect_base_secs: Option<u64>,
    signal_interval_secs: Option<u64>,
    drift_window_secs: Option<u64>,
    drift_threshold: Option<f64>,
    imbalance_threshold: Option<f64>,
    volume_surge_threshold: Option<f64>,
    volume_window_secs: Option<u64>,
    bind_addr: Option<String>,
    cors_allowed_origins: Option<Vec<String>>,
    alerting_enabled: Option<bool>,
    webhook_urls: Option<Vec<String>>,
    alert_cooldown_secs: Option<u64>,
    trade_ring_capacity: Option<usize>,
    snapshot_ring_capacity: Option<usize>,
    log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rest_base_url: "https://trading-api.kalshi.com/trade-api/v2".to_string(),
            stream_url: "wss://trading-api.kalshi.com/trade-api/ws/v2".to_string(),
            api_key_id: None,
            private_key_path: None,
            order_book_auth_required: false,
            rest_poll_interval_secs: 10,
            rate_limit_per_second: 10,
            stream_reconnect_base_secs: 5,
            signal_interval_secs: 1,
            drift_window_secs: 60,
            drift_threshold: 2.0,
            imbalance_threshold: 0.3,
            volume_surge_threshold: 3.0,
            volume_window_secs: 30,
            bind_addr: "0.0.0.0:8080".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
            alerting_enabled: true,
            webhook_urls: Vec::new(),
            alert_cooldown_secs: 300,
            trade_ring_capacity: 1000,
            snapshot_ring_capacity: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads defaults, overlays an optional TOML file, then overlays process
    /// environment variables, then the handful of CLI flags last.
    pub fn load(cli: &Cli) -> Result<Self, EngineError> {
        let mut cfg = Config::default();

        let toml_path = cli.config.clone().or_else(|| env::var("CONFIG_PATH").ok().map(PathBuf::from));
        if let Some(path) = toml_path {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                EngineError::ConfigError(format!("unreadable config file {}: {e}", path.display()))
            })?;
            let overlay: TomlOverlay = toml::from_str(&raw)
                .map_err(|e| EngineError::ConfigError(format!("invalid TOML in {}: {e}", path.display())))?;
            cfg.apply_toml(overlay);
        }

        cfg.apply_env();

        if let Some(bind_addr) = &cli.bind_addr {
            cfg.bind_addr = bind_addr.clone();
        }
        if let Some(log_level) = &cli.log_level {
            cfg.log_level = log_level.clone();
        }

        if cfg.order_book_auth_required && (cfg.api_key_id.is_none() || cfg.private_key_path.is_none()) {
            return Err(EngineError::ConfigError(
                "order book auth is required but API_KEY_ID or PRIVATE_KEY_PATH is missing".to_string(),
            ));
        }

        Ok(cfg)
    }

    fn apply_toml(&mut self, overlay: TomlOverlay) {
        macro_rules! overlay_field {
            ($field:ident) => {
                if let Some(v) = overlay.$field {
                    self.$field = v;
                }
            };
        }
        overlay_field!(rest_base_url);
        overlay_field!(stream_url);
        overlay_field!(api_key_id);
        overlay_field!(order_book_auth_required);
        overlay_field!(rest_poll_interval_secs);
        overlay_field!(rate_limit_per_second);
        overlay_field!(stream_reconnect_base_secs);
        overlay_field!(signal_interval_secs);
        overlay_field!(drift_window_secs);
        overlay_field!(drift_threshold);
        overlay_field!(imbalance_threshold);
        overlay_field!(volume_surge_threshold);
        overlay_field!(volume_window_secs);
        overlay_field!(bind_addr);
        overlay_field!(cors_allowed_origins);
        overlay_field!(alerting_enabled);
        overlay_field!(webhook_urls);
        overlay_field!(alert_cooldown_secs);
        overlay_field!(trade_ring_capacity);
        overlay_field!(snapshot_ring_capacity);
        overlay_field!(log_level);
        if let Some(p) = overlay.private_key_path {
            self.private_key_path = Some(PathBuf::from(p));
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("REST_BASE_URL") {
            self.rest_base_url = v;
        }
        if let Ok(v) = env::var("STREAM_URL") {
            self.stream_url = v;
        }
        if let Ok(v) = env::var("API_KEY_ID") {
            self.api_key_id = Some(v);
        }
        if let Ok(v) = env::var("PRIVATE_KEY_PATH") {
            self.private_key_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("ORDER_BOOK_AUTH_REQUIRED") {
            self.order_book_auth_required = v.parse().unwrap_or(self.order_book_auth_required);
        }
        if let Ok(v) = env::var("REST_POLL_INTERVAL_SECS") {
            self.rest_poll_interval_secs = v.parse().unwrap_or(self.rest_poll_interval_secs);
        }
        if let Ok(v) = env::var("RATE_LIMIT_PER_SECOND") {
            self.rate_limit_per_second = v.parse().unwrap_or(self.rate_limit_per_second);
        }
        if let Ok(v) = env::var("STREAM_RECONNECT_BASE_SECS") {
            self.stream_reconnect_base_secs = v.parse().unwrap_or(self.stream_reconnect_base_secs);
        }
        if let Ok(v) = env::var("SIGNAL_INTERVAL_SECS") {
            self.signal_interval_secs = v.parse().unwrap_or(self.signal_interval_secs);
        }
        if let Ok(v) = env::var("DRIFT_WINDOW_SECS") {
            self.drift_window_secs = v.parse().unwrap_or(self.drift_window_secs);
        }
        if let Ok(v) = env::var("DRIFT_THRESHOLD") {
            self.drift_threshold = v.parse().unwrap_or(self.drift_threshold);
        }
        if let Ok(v) = env::var("IMBALANCE_THRESHOLD") {
            self.imbalance_threshold = v.parse().unwrap_or(self.imbalance_threshold);
        }
        if let Ok(v) = env::var("VOLUME_SURGE_THRESHOLD") {
            self.volume_surge_threshold = v.parse().unwrap_or(self.volume_surge_threshold);
        }
        if let Ok(v) = env::var("VOLUME_WINDOW_SECS") {
            self.volume_window_secs = v.parse().unwrap_or(self.volume_window_secs);
        }
        if let Ok(v) = env::var("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = env::var("CORS_ALLOWED_ORIGINS") {
            self.cors_allowed_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("ALERTING_ENABLED") {
            self.alerting_enabled = v.parse().unwrap_or(self.alerting_enabled);
        }
        if let Ok(v) = env::var("WEBHOOK_URLS") {
            self.webhook_urls = v.split(',').filter(|s| !s.is_empty()).map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("ALERT_COOLDOWN_SECS") {
            self.alert_cooldown_secs = v.parse().unwrap_or(self.alert_cooldown_secs);
        }
        if let Ok(v) = env::var("TRADE_RING_CAPACITY") {
            self.trade_ring_capacity = v.parse().unwrap_or(self.trade_ring_capacity);
        }
        if let Ok(v) = env::var("SNAPSHOT_RING_CAPACITY") {
            self.snapshot_ring_capacity = v.parse().unwrap_or(self.snapshot_ring_capacity);
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.log_level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = Config::default();
        assert!(!cfg.order_book_auth_required);
        assert!(cfg.rate_limit_per_second > 0);
    }

    #[test]
    fn auth_required_without_key_fails_load() {
        let cli = Cli { config: None, bind_addr: None, log_level: None };
        env::remove_var("API_KEY_ID");
        env::remove_var("PRIVATE_KEY_PATH");
        env::set_var("ORDER_BOOK_AUTH_REQUIRED", "true");
        let result = Config::load(&cli);
        env::remove_var("ORDER_BOOK_AUTH_REQUIRED");
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }
}
