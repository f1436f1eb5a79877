//! Drivers backed by the host operating system
//!
//! On a desktop the OS owns the wireless link, so the link driver only
//! observes whether the host has a routable address. Tunnels are not
//! available on the host; the shell uses `ssh2` when built with the `ssh`
//! feature.

use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use super::transport::{
    Drivers, LinkDriver, ReadOutcome, Result, ShellTarget, ShellTransport, TransportError, TunnelDriver,
};
use crate::store::TunnelConfig;

/// Documentation address used to pick the outbound interface. Nothing is sent.
const PROBE_ADDR: &str = "192.0.2.1:9";

/// Link that follows the host's network configuration
#[derive(Debug, Default)]
pub struct HostLink {
    ssid: Option<String>,
    /// Set by `disconnect` until the next `begin`
    released: bool,
}

impl HostLink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkDriver for HostLink {
    fn begin(&mut self, ssid: &str, _password: &str) -> bool {
        tracing::info!("Host link: network selection for {} is managed by the OS", ssid);
        self.ssid = Some(ssid.to_string());
        self.released = false;
        true
    }

    fn is_up(&self) -> bool {
        self.local_addr().is_some()
    }

    fn disconnect(&mut self) {
        self.released = true;
        self.ssid = None;
    }

    fn local_addr(&self) -> Option<IpAddr> {
        if self.released {
            return None;
        }
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(PROBE_ADDR).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        if ip.is_unspecified() || ip.is_loopback() {
            None
        } else {
            Some(ip)
        }
    }
}

/// Tunnel driver for hosts without a tunnel backend
#[derive(Debug, Default)]
pub struct UnsupportedTunnel;

impl TunnelDriver for UnsupportedTunnel {
    fn begin(&mut self, config: &TunnelConfig) -> bool {
        tracing::warn!(
            "No tunnel backend on this host, cannot reach {}:{}",
            config.endpoint_host,
            config.endpoint_port
        );
        false
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn end(&mut self) {}
}

/// Shell used when the binary was built without the `ssh` feature
#[cfg_attr(feature = "ssh", allow(dead_code))]
#[derive(Debug, Default)]
pub struct UnavailableShell;

impl ShellTransport for UnavailableShell {
    fn open(&mut self, _target: &ShellTarget, _timeout: Duration) -> Result<()> {
        Err(TransportError::Unsupported(
            "built without the 'ssh' feature".to_string(),
        ))
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(TransportError::NotOpen)
    }

    fn read_nonblocking(&mut self, _buf: &mut [u8]) -> ReadOutcome {
        ReadOutcome::Error("channel is not open".to_string())
    }

    fn close(&mut self) {}
}

/// Drivers for running on a desktop host
pub fn host_drivers() -> Drivers {
    #[cfg(feature = "ssh")]
    let shell: Box<dyn ShellTransport> = Box::new(super::ssh::SshShell::new());
    #[cfg(not(feature = "ssh"))]
    let shell: Box<dyn ShellTransport> = Box::new(UnavailableShell);

    Drivers {
        link: Box::new(HostLink::new()),
        tunnel: Box::new(UnsupportedTunnel),
        shell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_link_reports_down() {
        let mut link = HostLink::new();
        link.disconnect();
        assert!(!link.is_up());
        assert!(link.local_addr().is_none());
        assert!(link.begin("any", ""));
    }

    #[test]
    fn test_unsupported_tunnel_never_ready() {
        let mut tunnel = UnsupportedTunnel;
        let config = TunnelConfig {
            local_private_key: String::new(),
            remote_public_key: String::new(),
            endpoint_host: "vpn".into(),
            endpoint_port: 51820,
            local_address: "10.0.0.2".into(),
        };
        assert!(!tunnel.begin(&config));
        assert!(!tunnel.is_ready());
    }

    #[test]
    fn test_unavailable_shell_refuses_open() {
        let mut shell = UnavailableShell;
        let target = ShellTarget {
            host: "h".into(),
            port: 22,
            user: "u".into(),
            secret: String::new(),
        };
        let err = shell.open(&target, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::Unsupported(_)));
        assert!(matches!(shell.write(b"x"), Err(TransportError::NotOpen)));
    }
}
