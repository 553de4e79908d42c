use std::env;
use std::time::Duration;

use crate::console::SessionTimings;
use crate::console::status::FadeTimings;

pub const DEFAULT_API_BASE: &str = "http://192.168.0.200:80";

/// Console configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the VM management API.
    pub api_base: String,
    /// Bearer token for the API.
    pub api_token: Option<String>,
    pub timings: SessionTimings,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = SessionTimings::default();
        Self {
            api_base: env_string("VMDECK_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_token: env_string("VMDECK_API_TOKEN"),
            timings: SessionTimings {
                frame_interval: env_millis("VMDECK_FRAME_INTERVAL_MS")
                    .unwrap_or(defaults.frame_interval),
                fade: FadeTimings {
                    fade_after: env_millis("VMDECK_STATUS_FADE_MS")
                        .unwrap_or(defaults.fade.fade_after),
                    hide_after: env_millis("VMDECK_STATUS_HIDE_MS")
                        .unwrap_or(defaults.fade.hide_after),
                },
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_token: None,
            timings: SessionTimings::default(),
        }
    }
}

fn env_string(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_millis(var: &str) -> Option<Duration> {
    env_string(var)
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    // Environment variables are process-global.
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    const VARS: [&str; 5] = [
        "VMDECK_API_BASE",
        "VMDECK_API_TOKEN",
        "VMDECK_FRAME_INTERVAL_MS",
        "VMDECK_STATUS_FADE_MS",
        "VMDECK_STATUS_HIDE_MS",
    ];

    fn clear() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test_timeout::timeout]
    fn defaults_without_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear();

        let config = Config::from_env();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.api_token.is_none());
        assert_eq!(config.timings, SessionTimings::default());
    }

    #[test_timeout::timeout]
    fn reads_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear();
        unsafe {
            env::set_var("VMDECK_API_BASE", "http://10.0.0.2:8000");
            env::set_var("VMDECK_API_TOKEN", "jwt");
            env::set_var("VMDECK_STATUS_FADE_MS", "1200");
            env::set_var("VMDECK_FRAME_INTERVAL_MS", "not-a-number");
        }

        let config = Config::from_env();
        clear();

        assert_eq!(config.api_base, "http://10.0.0.2:8000");
        assert_eq!(config.api_token.as_deref(), Some("jwt"));
        assert_eq!(config.timings.fade.fade_after, Duration::from_millis(1200));
        assert_eq!(config.timings.fade.hide_after, Duration::from_millis(500));
        assert_eq!(config.timings.frame_interval, Duration::from_millis(16));
    }
}
