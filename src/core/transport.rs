//! Link, tunnel and shell driver interfaces
//!
//! The session engine talks to the network through three narrow traits so the
//! same state machine runs over real hardware drivers, the host network
//! stack, or the scripted drivers used in tests.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::store::TunnelConfig;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication rejected for user {0}")]
    Auth(String),

    #[error("Failed to open channel: {0}")]
    Channel(String),

    #[error("Failed to write to channel: {0}")]
    Write(#[source] io::Error),

    #[error("Channel is not open")]
    NotOpen,

    #[error("Transport not available: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Outcome of a single non-blocking read
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were placed in the buffer
    Data(usize),
    /// Nothing available right now
    Empty,
    /// The remote side closed the channel
    Eof,
    /// Hard channel error
    Error(String),
}

/// Parameters for opening a shell channel
#[derive(Debug, Clone, PartialEq)]
pub struct ShellTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
}

/// Wireless (or host) network link
pub trait LinkDriver: Send {
    /// Start joining `ssid`. Completion is observed through [`LinkDriver::is_up`].
    fn begin(&mut self, ssid: &str, password: &str) -> bool;

    /// True once the link has an address
    fn is_up(&self) -> bool;

    /// Drop the link
    fn disconnect(&mut self);

    /// Local address on the link, if any
    fn local_addr(&self) -> Option<IpAddr>;
}

/// Point-to-point overlay tunnel
pub trait TunnelDriver: Send {
    /// Configure the interface and start the handshake
    fn begin(&mut self, config: &TunnelConfig) -> bool;

    /// True once the handshake completed
    fn is_ready(&self) -> bool;

    /// Tear the tunnel down
    fn end(&mut self);
}

/// Secure remote shell
pub trait ShellTransport: Send {
    /// Connect, authenticate and open an interactive shell channel
    fn open(&mut self, target: &ShellTarget, timeout: Duration) -> Result<()>;

    /// Write bytes to the open channel
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read without blocking
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Close the channel and the session. Safe to call when nothing is open.
    fn close(&mut self);
}

/// Factory for the three drivers a session needs
pub struct Drivers {
    pub link: Box<dyn LinkDriver>,
    pub tunnel: Box<dyn TunnelDriver>,
    pub shell: Box<dyn ShellTransport>,
}

#[cfg(test)]
pub mod mock {
    //! Scripted drivers that record every call

    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Shared call log so tests can assert stage ordering
    #[derive(Clone, Default)]
    pub struct CallLog(Arc<Mutex<Vec<String>>>);

    impl CallLog {
        pub fn push(&self, call: impl Into<String>) {
            self.0.lock().push(call.into());
        }

        pub fn calls(&self) -> Vec<String> {
            self.0.lock().clone()
        }

        pub fn contains_prefix(&self, prefix: &str) -> bool {
            self.0.lock().iter().any(|c| c.starts_with(prefix))
        }
    }

    pub struct MockLink {
        pub log: CallLog,
        pub up: Arc<Mutex<bool>>,
        pub accept: bool,
    }

    impl LinkDriver for MockLink {
        fn begin(&mut self, ssid: &str, _password: &str) -> bool {
            self.log.push(format!("link.begin {}", ssid));
            if self.accept {
                *self.up.lock() = true;
            }
            self.accept
        }

        fn is_up(&self) -> bool {
            *self.up.lock()
        }

        fn disconnect(&mut self) {
            self.log.push("link.disconnect");
            *self.up.lock() = false;
        }

        fn local_addr(&self) -> Option<IpAddr> {
            if *self.up.lock() {
                Some(IpAddr::from([192, 168, 1, 50]))
            } else {
                None
            }
        }
    }

    pub struct MockTunnel {
        pub log: CallLog,
        /// Number of `is_ready` polls before the handshake completes
        pub ready_after: Option<usize>,
        pub polls: Arc<Mutex<usize>>,
    }

    impl TunnelDriver for MockTunnel {
        fn begin(&mut self, config: &TunnelConfig) -> bool {
            self.log.push(format!("tunnel.begin {}:{}", config.endpoint_host, config.endpoint_port));
            true
        }

        fn is_ready(&self) -> bool {
            let mut polls = self.polls.lock();
            *polls += 1;
            matches!(self.ready_after, Some(n) if *polls > n)
        }

        fn end(&mut self) {
            self.log.push("tunnel.end");
        }
    }

    /// What the mock shell should do when opened
    #[derive(Clone)]
    pub enum OpenBehavior {
        Accept,
        RefuseConnect,
        RejectAuth,
        FailChannel,
    }

    /// Scripted result of a read
    pub enum MockRead {
        Bytes(Vec<u8>),
        Eof,
        Error(String),
    }

    /// Shell whose receive side is fed by the test
    pub struct MockShell {
        pub log: CallLog,
        pub behavior: OpenBehavior,
        pub incoming: Arc<Mutex<VecDeque<MockRead>>>,
        pub written: Arc<Mutex<Vec<u8>>>,
        pub open: bool,
    }

    impl ShellTransport for MockShell {
        fn open(&mut self, target: &ShellTarget, _timeout: Duration) -> Result<()> {
            self.log.push(format!("shell.open {}:{}", target.host, target.port));
            match self.behavior {
                OpenBehavior::Accept => {
                    self.open = true;
                    Ok(())
                }
                OpenBehavior::RefuseConnect => Err(TransportError::Connect {
                    host: target.host.clone(),
                    port: target.port,
                    reason: "connection refused".to_string(),
                }),
                OpenBehavior::RejectAuth => Err(TransportError::Auth(target.user.clone())),
                OpenBehavior::FailChannel => Err(TransportError::Channel("no pty".to_string())),
            }
        }

        fn write(&mut self, data: &[u8]) -> Result<usize> {
            if !self.open {
                return Err(TransportError::NotOpen);
            }
            self.written.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn read_nonblocking(&mut self, buf: &mut [u8]) -> ReadOutcome {
            let mut incoming = self.incoming.lock();
            match incoming.pop_front() {
                Some(MockRead::Bytes(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        incoming.push_front(MockRead::Bytes(bytes.split_off(n)));
                    }
                    ReadOutcome::Data(n)
                }
                Some(MockRead::Eof) => ReadOutcome::Eof,
                Some(MockRead::Error(e)) => ReadOutcome::Error(e),
                None => ReadOutcome::Empty,
            }
        }

        fn close(&mut self) {
            if self.open {
                self.log.push("shell.close");
            }
            self.open = false;
        }
    }
}
