//! Configuration for pagerterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.pagerterm/config.toml`
//! - Timing and buffer limits for the session engine
//! - Fallback profiles, link credentials and tunnel parameters
//!
//! # Configuration File
//!
//! ```toml
//! log_level = "info"
//!
//! [timing]
//! poll_interval_ms = 10
//! flush_interval_ms = 100
//! tunnel_attempts = 10
//!
//! [pool]
//! size = 16
//! message_capacity = 1024
//!
//! [link]
//! fallback_ssid = "office"
//! fallback_password = "..."
//!
//! [profiles.local]
//! host = "192.168.1.10"
//! user = "pi"
//!
//! [tunnel_fallback]
//! private_key = "..."
//! public_key = "..."
//! endpoint = "vpn.example.net:51820"
//! local_ip = "10.0.0.2"
//!
//! [colors]
//! red = "FF3333"
//! ```
//!
//! Fallback values are placeholders for the device owner to fill in. No
//! credentials ship with the defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::filter::MarkerPalette;
use crate::core::pool::{DEFAULT_MESSAGE_CAPACITY, DEFAULT_POOL_SIZE};
use crate::store::{Profile, StoredTunnel, LOCAL_PROFILE, REMOTE_PROFILE};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when `PAGERTERM_LOG` is not set
    pub log_level: String,
    /// Store document path (defaults to `~/.pagerterm/store.toml`)
    pub store_path: Option<PathBuf>,
    pub timing: TimingConfig,
    pub pool: PoolConfig,
    pub transcript: TranscriptConfig,
    pub link: LinkConfig,
    /// Profiles used when the store has no entry of that name
    pub profiles: BTreeMap<String, FallbackProfile>,
    /// Tunnel parameters used when the store has none
    pub tunnel_fallback: Option<StoredTunnel>,
    /// Hex colors for the inline color markers
    pub colors: MarkerPalette,
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            LOCAL_PROFILE.to_string(),
            FallbackProfile {
                host: "192.168.1.10".to_string(),
                ..FallbackProfile::default()
            },
        );
        profiles.insert(
            REMOTE_PROFILE.to_string(),
            FallbackProfile {
                host: "10.0.0.1".to_string(),
                tunnel: true,
                ..FallbackProfile::default()
            },
        );

        Self {
            log_level: "info".to_string(),
            store_path: None,
            timing: TimingConfig::default(),
            pool: PoolConfig::default(),
            transcript: TranscriptConfig::default(),
            link: LinkConfig::default(),
            profiles,
            tunnel_fallback: None,
            colors: MarkerPalette::default(),
        }
    }
}

/// Timing constants for the connection attempt and the receive loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Sleep between empty channel reads
    pub poll_interval_ms: u64,
    /// Minimum time between two flushes to the UI
    pub flush_interval_ms: u64,
    /// Pending bytes that trigger a flush before the interval elapses
    pub flush_threshold: usize,
    /// Flush buffer size that triggers a trim
    pub flush_cap: usize,
    /// Bytes kept when the flush buffer is trimmed
    pub flush_keep: usize,
    /// How long `disconnect` waits for the receive loop to notice
    pub disconnect_grace_ms: u64,
    pub link_attempts: u32,
    pub link_retry_ms: u64,
    pub tunnel_attempts: u32,
    pub tunnel_retry_ms: u64,
    /// Shell connect/authenticate timeout
    pub shell_timeout_secs: u64,
    /// Period of the status line refresh
    pub status_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            flush_interval_ms: 100,
            flush_threshold: 1024,
            flush_cap: 2048,
            flush_keep: 1024,
            disconnect_grace_ms: 100,
            link_attempts: 30,
            link_retry_ms: 500,
            tunnel_attempts: 10,
            tunnel_retry_ms: 500,
            shell_timeout_secs: 10,
            status_interval_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    pub fn link_retry(&self) -> Duration {
        Duration::from_millis(self.link_retry_ms)
    }

    pub fn tunnel_retry(&self) -> Duration {
        Duration::from_millis(self.tunnel_retry_ms)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

/// Message pool dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub size: usize,
    pub message_capacity: usize,
    /// Depth of the render command queue
    pub queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            queue_depth: 64,
        }
    }
}

/// Limits of the on-screen transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub cap: usize,
    pub keep: usize,
    /// Restore the previous transcript at startup
    pub persist: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            cap: 4096,
            keep: 2048,
            persist: true,
        }
    }
}

/// Link fallback credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub fallback_ssid: Option<String>,
    pub fallback_password: Option<String>,
}

/// A profile placeholder from the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackProfile {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
    pub tunnel: bool,
}

impl Default for FallbackProfile {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: crate::store::DEFAULT_SHELL_PORT,
            user: String::new(),
            secret: String::new(),
            tunnel: false,
        }
    }
}

impl FallbackProfile {
    pub fn to_profile(&self, name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            secret: self.secret.clone(),
            tunnel: self.tunnel,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`, falling back to defaults
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), String> {
        if let Some(path) = Self::get_config_path() {
            let content = toml::to_string_pretty(self)
                .map_err(|e| format!("Failed to serialize config: {}", e))?;
            fs::write(&path, content)
                .map_err(|e| format!("Failed to write config: {}", e))?;
            Ok(())
        } else {
            Err("Could not determine config path".to_string())
        }
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        app_dir().map(|dir| dir.join("config.toml"))
    }

    /// Store document path
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store_path
            .clone()
            .or_else(|| app_dir().map(|dir| dir.join("store.toml")))
    }

    /// Built-in profile for `name`, if the configuration has one
    pub fn fallback_profile(&self, name: &str) -> Option<Profile> {
        self.profiles
            .get(name)
            .filter(|p| !p.host.is_empty())
            .map(|p| p.to_profile(name))
    }
}

/// `~/.pagerterm`, created on first use
pub fn app_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".pagerterm");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_both_fallback_profiles() {
        let config = Config::default();
        let local = config.fallback_profile("local").unwrap();
        assert_eq!(local.host, "192.168.1.10");
        assert_eq!(local.port, 22);
        assert!(!local.tunnel);

        let remote = config.fallback_profile("remote").unwrap();
        assert!(remote.tunnel);
        assert!(config.fallback_profile("other").is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [timing]
            tunnel_attempts = 3

            [profiles.lab]
            host = "172.16.0.5"
            user = "ops"
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.tunnel_attempts, 3);
        assert_eq!(config.timing.flush_interval_ms, 100);
        assert_eq!(config.pool.size, 16);
        let lab = config.fallback_profile("lab").unwrap();
        assert_eq!(lab.port, 22);
        assert_eq!(lab.user, "ops");
        // A [profiles] table in the file replaces the built-in map
        assert!(config.fallback_profile("local").is_none());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timing = \"fast\"").unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.timing.poll_interval_ms, 10);
    }

    #[test]
    fn test_tunnel_fallback_section() {
        let config: Config = toml::from_str(
            r#"
            [tunnel_fallback]
            private_key = "a"
            public_key = "b"
            endpoint = "188.70.11.115:51820"
            local_ip = "10.0.0.2"
            "#,
        )
        .unwrap();
        assert_eq!(config.tunnel_fallback.unwrap().endpoint, "188.70.11.115:51820");
    }
}
