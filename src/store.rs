//! Durable key/value store for connection profiles
//!
//! Profiles, tunnel parameters, link credentials, command history and the
//! terminal transcript live in one TOML document (`~/.pagerterm/store.toml`
//! by default). Every save rewrites the document.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Profile name that routes through the tunnel
pub const REMOTE_PROFILE: &str = "remote";

/// Profile name for the local network host
pub const LOCAL_PROFILE: &str = "local";

/// Default shell port
pub const DEFAULT_SHELL_PORT: u16 = 22;

/// Tunnel endpoint port used when the endpoint carries none
pub const DEFAULT_TUNNEL_PORT: u16 = 51820;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed store document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize store: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A named set of shell connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    pub host: String,
    #[serde(default = "default_shell_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub secret: String,
    /// Bring the tunnel up before opening the shell
    #[serde(default)]
    pub tunnel: bool,
}

fn default_shell_port() -> u16 {
    DEFAULT_SHELL_PORT
}

impl Profile {
    pub fn new(name: &str, host: &str, port: u16, user: &str, secret: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            user: user.to_string(),
            secret: secret.to_string(),
            tunnel: name == REMOTE_PROFILE,
        }
    }
}

/// Tunnel parameters exactly as the user saved them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTunnel {
    pub private_key: String,
    pub public_key: String,
    /// `host:port` or bare `host`
    pub endpoint: String,
    pub local_ip: String,
}

impl StoredTunnel {
    pub fn is_empty(&self) -> bool {
        self.private_key.is_empty()
    }
}

/// Tunnel parameters ready for the tunnel driver
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelConfig {
    pub local_private_key: String,
    pub remote_public_key: String,
    pub endpoint_host: String,
    pub endpoint_port: u16,
    pub local_address: String,
}

impl From<&StoredTunnel> for TunnelConfig {
    fn from(stored: &StoredTunnel) -> Self {
        let (endpoint_host, endpoint_port) = split_endpoint(&stored.endpoint);
        Self {
            local_private_key: stored.private_key.clone(),
            remote_public_key: stored.public_key.clone(),
            endpoint_host,
            endpoint_port,
            local_address: stored.local_ip.clone(),
        }
    }
}

/// Split `host:port` into its parts.
///
/// A missing or unparsable port yields [`DEFAULT_TUNNEL_PORT`]. Bracketed
/// IPv6 literals (`[::1]:51820`) are supported; an unbracketed IPv6 literal
/// is taken whole as the host.
pub fn split_endpoint(endpoint: &str) -> (String, u16) {
    let endpoint = endpoint.trim();

    if let Some(rest) = endpoint.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_TUNNEL_PORT);
            return (host.to_string(), port);
        }
    }

    match endpoint.rsplit_once(':').filter(|(host, _)| !host.contains(':')) {
        Some((host, port)) => {
            let port = port.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid tunnel endpoint port '{}', using {}", port, DEFAULT_TUNNEL_PORT);
                DEFAULT_TUNNEL_PORT
            });
            (host.to_string(), port)
        }
        None => (endpoint.to_string(), DEFAULT_TUNNEL_PORT),
    }
}

/// Last link credentials that worked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCredentials {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

/// Persistence interface consumed by the session engine
pub trait ProfileStore: Send + Sync {
    fn save_profile(&self, profile: &Profile) -> Result<()>;
    fn load_profile(&self, name: &str) -> Result<Profile>;

    fn save_tunnel_config(&self, tunnel: &StoredTunnel) -> Result<()>;
    fn load_tunnel_config(&self) -> Result<Option<StoredTunnel>>;

    fn save_link_credentials(&self, creds: &LinkCredentials) -> Result<()>;
    fn load_link_credentials(&self) -> Result<Option<LinkCredentials>>;

    fn save_history(&self, entries: &[String]) -> Result<()>;
    fn load_history(&self) -> Result<Vec<String>>;

    fn save_transcript(&self, text: &str) -> Result<()>;
    fn load_transcript(&self) -> Result<String>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    history: Vec<String>,
    transcript: String,
    link: Option<LinkCredentials>,
    tunnel: Option<StoredTunnel>,
    profiles: BTreeMap<String, Profile>,
}

/// TOML-file store. With no path it keeps everything in memory.
pub struct TomlStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl TomlStore {
    /// Open (or start) the store document at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            toml::from_str(&content)?
        } else {
            StoreData::default()
        };

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// A store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn update(&self, f: impl FnOnce(&mut StoreData)) -> Result<()> {
        let mut data = self.data.lock();
        f(&mut data);
        self.persist(&data)
    }

    fn persist(&self, data: &StoreData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = toml::to_string_pretty(data)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })
    }
}

impl ProfileStore for TomlStore {
    fn save_profile(&self, profile: &Profile) -> Result<()> {
        tracing::info!("Saving profile {}", profile.name);
        self.update(|d| {
            d.profiles.insert(profile.name.clone(), profile.clone());
        })
    }

    fn load_profile(&self, name: &str) -> Result<Profile> {
        let data = self.data.lock();
        let mut profile = data
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        profile.name = name.to_string();
        Ok(profile)
    }

    fn save_tunnel_config(&self, tunnel: &StoredTunnel) -> Result<()> {
        self.update(|d| d.tunnel = Some(tunnel.clone()))
    }

    fn load_tunnel_config(&self) -> Result<Option<StoredTunnel>> {
        Ok(self.data.lock().tunnel.clone().filter(|t| !t.is_empty()))
    }

    fn save_link_credentials(&self, creds: &LinkCredentials) -> Result<()> {
        self.update(|d| d.link = Some(creds.clone()))
    }

    fn load_link_credentials(&self) -> Result<Option<LinkCredentials>> {
        Ok(self.data.lock().link.clone().filter(|c| !c.ssid.is_empty()))
    }

    fn save_history(&self, entries: &[String]) -> Result<()> {
        self.update(|d| d.history = entries.to_vec())
    }

    fn load_history(&self) -> Result<Vec<String>> {
        Ok(self.data.lock().history.clone())
    }

    fn save_transcript(&self, text: &str) -> Result<()> {
        self.update(|d| d.transcript = text.to_string())
    }

    fn load_transcript(&self) -> Result<String> {
        Ok(self.data.lock().transcript.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_round_trip() {
        let store = TomlStore::in_memory();
        store.save_profile(&Profile::new("local", "h", 22, "u", "p")).unwrap();

        let p = store.load_profile("local").unwrap();
        assert_eq!(p.host, "h");
        assert_eq!(p.port, 22);
        assert_eq!(p.user, "u");
        assert_eq!(p.secret, "p");
        assert!(!p.tunnel);
    }

    #[test]
    fn test_missing_profile() {
        let store = TomlStore::in_memory();
        assert!(matches!(store.load_profile("nope"), Err(StoreError::NotFound(n)) if n == "nope"));
    }

    #[test]
    fn test_remote_profile_uses_tunnel() {
        assert!(Profile::new(REMOTE_PROFILE, "10.0.0.1", 22, "u", "p").tunnel);
        assert!(!Profile::new("work", "10.0.0.1", 22, "u", "p").tunnel);
    }

    #[test]
    fn test_split_endpoint() {
        assert_eq!(split_endpoint("188.70.11.115:51820"), ("188.70.11.115".to_string(), 51820));
        assert_eq!(split_endpoint("vpn.example.net"), ("vpn.example.net".to_string(), 51820));
        assert_eq!(split_endpoint("vpn.example.net:4500"), ("vpn.example.net".to_string(), 4500));
        assert_eq!(split_endpoint("host:notaport"), ("host".to_string(), 51820));
        assert_eq!(split_endpoint("[2001:db8::1]:6000"), ("2001:db8::1".to_string(), 6000));
        assert_eq!(split_endpoint("[2001:db8::1]"), ("2001:db8::1".to_string(), 51820));
        assert_eq!(split_endpoint("2001:db8::1"), ("2001:db8::1".to_string(), 51820));
        assert_eq!(split_endpoint("fe80::1:51820"), ("fe80::1:51820".to_string(), 51820));
    }

    #[test]
    fn test_tunnel_config_from_stored() {
        let stored = StoredTunnel {
            private_key: "priv".into(),
            public_key: "pub".into(),
            endpoint: "188.70.11.115:51820".into(),
            local_ip: "10.0.0.2".into(),
        };
        let cfg = TunnelConfig::from(&stored);
        assert_eq!(cfg.endpoint_host, "188.70.11.115");
        assert_eq!(cfg.endpoint_port, 51820);
        assert_eq!(cfg.local_address, "10.0.0.2");
        assert_eq!(cfg.local_private_key, "priv");
    }

    #[test]
    fn test_empty_tunnel_reads_as_absent() {
        let store = TomlStore::in_memory();
        assert!(store.load_tunnel_config().unwrap().is_none());
        store
            .save_tunnel_config(&StoredTunnel {
                private_key: String::new(),
                public_key: String::new(),
                endpoint: String::new(),
                local_ip: String::new(),
            })
            .unwrap();
        assert!(store.load_tunnel_config().unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.toml");

        {
            let store = TomlStore::open(&path).unwrap();
            store.save_profile(&Profile::new("remote", "10.0.0.1", 2222, "me", "s3cret")).unwrap();
            store
                .save_link_credentials(&LinkCredentials {
                    ssid: "home".into(),
                    password: "pw".into(),
                })
                .unwrap();
            store.save_history(&["ls".to_string(), "help".to_string()]).unwrap();
            store.save_transcript("hello #FF3333 red#/").unwrap();
        }

        let store = TomlStore::open(&path).unwrap();
        let p = store.load_profile("remote").unwrap();
        assert_eq!(p.port, 2222);
        assert!(p.tunnel);
        assert_eq!(store.load_link_credentials().unwrap().unwrap().ssid, "home");
        assert_eq!(store.load_history().unwrap(), vec!["ls", "help"]);
        assert_eq!(store.load_transcript().unwrap(), "hello #FF3333 red#/");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        fs::write(&path, "profiles = 3").unwrap();
        assert!(matches!(TomlStore::open(&path), Err(StoreError::Parse(_))));
    }
}
