//! Session management
//!
//! Owns the connection lifecycle: link, optional tunnel, then the remote
//! shell channel. Connection attempts run on their own thread and report
//! progress and failures as text through the UI handle.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use super::filter::EscapeFilter;
use super::receiver::{LoopExit, ReceiveLoop};
use super::transport::{Drivers, LinkDriver, ShellTarget, ShellTransport, TransportError, TunnelDriver};
use crate::config::Config;
use crate::store::{LinkCredentials, Profile, ProfileStore, StoreError, TunnelConfig};
use crate::ui::surface::UiHandle;

/// Session failures, worded the way they are shown to the user
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("[BUSY] Connection in progress...")]
    Busy,

    #[error("[INFO] Already connected. Type 'exit' first.")]
    AlreadyConnected,

    #[error("[ERROR] Link Offline. Check WiFi.")]
    LinkUnavailable,

    #[error("[FAILED] Handshake timeout.")]
    TunnelTimeout,

    #[error("[ERROR] Tunnel Failure. Aborting. ({0})")]
    TunnelFailure(String),

    #[error("[ERROR] SSH Negotiation Failed. {0}")]
    ConnectFailure(String),

    #[error("[ERROR] Authentication failed for '{0}'.")]
    AuthFailure(String),

    #[error("[ERROR] Could not open shell channel: {0}")]
    ChannelOpenFailure(String),

    #[error("[ERROR] Profile Not Found: {0}")]
    ProfileNotFound(String),

    #[error("{0}")]
    MalformedCommand(&'static str),

    #[error("Message pool exhausted")]
    PoolExhausted,
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect { .. } => SessionError::ConnectFailure(err.to_string()),
            TransportError::Auth(user) => SessionError::AuthFailure(user),
            TransportError::Channel(reason) | TransportError::Unsupported(reason) => {
                SessionError::ChannelOpenFailure(reason)
            }
            TransportError::Write(_) | TransportError::NotOpen => {
                SessionError::ChannelOpenFailure(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Down,
    Connecting,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelState {
    #[default]
    None,
    Establishing,
    Active,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellState {
    #[default]
    Idle,
    Authenticating,
    Open,
    Closed,
}

/// Overall position in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    LinkConnecting,
    LinkUp,
    TunnelEstablishing,
    TunnelUp,
    ShellAuthenticating,
    ShellOpen,
}

/// Snapshot of the session fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub link: LinkState,
    pub tunnel: TunnelState,
    pub shell: ShellState,
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl SessionState {
    /// Drop everything tied to the shell session. The link is left alone.
    fn reset(&mut self) {
        let link = self.link;
        *self = Self {
            link,
            ..Self::default()
        };
    }
}

/// What a connection attempt should bring up
enum Attempt {
    Profile(String),
    Manual(Profile),
    Link { ssid: String, password: String },
}

struct Shared {
    state: Mutex<SessionState>,
    /// A connection attempt is in flight
    connecting: AtomicBool,
    /// Receive loop run flag
    running: Arc<AtomicBool>,
    bytes: Arc<AtomicU64>,
    link: Mutex<Box<dyn LinkDriver>>,
    tunnel: Mutex<Box<dyn TunnelDriver>>,
    shell: Arc<Mutex<Box<dyn ShellTransport>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    store: Arc<dyn ProfileStore>,
    ui: UiHandle,
    config: Arc<Config>,
}

/// The one session of the application.
///
/// Clone the handle to share it between the UI thread and background work.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

/// Clears the in-flight flag when the attempt thread finishes, even by panic
struct InFlight(Arc<Shared>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.connecting.store(false, Ordering::SeqCst);
    }
}

impl Session {
    pub fn new(drivers: Drivers, store: Arc<dyn ProfileStore>, ui: UiHandle, config: Arc<Config>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::default()),
                connecting: AtomicBool::new(false),
                running: Arc::new(AtomicBool::new(false)),
                bytes: Arc::new(AtomicU64::new(0)),
                link: Mutex::new(drivers.link),
                tunnel: Mutex::new(drivers.tunnel),
                shell: Arc::new(Mutex::new(drivers.shell)),
                receiver: Mutex::new(None),
                store,
                ui,
                config,
            }),
        }
    }

    /// Connect using the stored (or built-in) profile `name`
    pub fn connect(&self, name: &str) -> Result<()> {
        self.start(Attempt::Profile(name.to_string()))
    }

    /// Connect using ad-hoc parameters
    pub fn connect_with(&self, profile: Profile) -> Result<()> {
        self.start(Attempt::Manual(profile))
    }

    /// Join a wireless network and remember the credentials on success
    pub fn connect_link(&self, ssid: &str, password: &str) -> Result<()> {
        self.start(Attempt::Link {
            ssid: ssid.to_string(),
            password: password.to_string(),
        })
    }

    fn start(&self, attempt: Attempt) -> Result<()> {
        let shared = &self.shared;
        if shared
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::Busy);
        }
        if !matches!(attempt, Attempt::Link { .. }) && self.is_open() {
            shared.connecting.store(false, Ordering::SeqCst);
            return Err(SessionError::AlreadyConnected);
        }

        let guard = InFlight(shared.clone());
        let spawned = thread::Builder::new()
            .name("connect".to_string())
            .spawn(move || {
                let shared = guard.0.clone();
                match attempt {
                    Attempt::Link { ssid, password } => run_link_attempt(&shared, &ssid, &password),
                    Attempt::Profile(name) => run_shell_attempt(&shared, |s| resolve_profile(s, &name)),
                    Attempt::Manual(profile) => run_shell_attempt(&shared, move |_| Ok(profile)),
                }
                drop(guard);
            });

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!("Failed to spawn connection thread: {}", e);
                shared.connecting.store(false, Ordering::SeqCst);
                Err(SessionError::ConnectFailure(e.to_string()))
            }
        }
    }

    /// Close the shell session.
    ///
    /// Signals the receive loop, waits a bounded grace period for it, then
    /// releases the channel and the tunnel. Safe to call with nothing open.
    pub fn disconnect(&self) {
        let shared = &self.shared;
        if shared.running.swap(false, Ordering::SeqCst) {
            wait_for_receiver(shared, shared.config.timing.disconnect_grace());
            teardown(shared);
            tracing::info!("Session disconnected by user");
        }
        shared.ui.line("SSH disconnected.");
    }

    /// Close the session (if any) and drop the link
    pub fn link_disconnect(&self) {
        if self.is_open() {
            self.disconnect();
        }
        self.shared.link.lock().disconnect();
        self.shared.state.lock().link = LinkState::Down;
        tracing::info!("Link disconnected");
        self.shared.ui.line("WiFi disconnected.");
    }

    /// Forward bytes to the shell. Ignored unless the shell is open.
    pub fn write(&self, data: &[u8]) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.shared.shell.lock().write(data) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Shell write failed: {}", e);
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().shell == ShellState::Open
    }

    pub fn is_connecting(&self) -> bool {
        self.shared.connecting.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    pub fn phase(&self) -> Phase {
        let state = self.state();
        if state.shell == ShellState::Open {
            return Phase::ShellOpen;
        }
        if !self.is_connecting() {
            return Phase::Disconnected;
        }
        match (state.shell, state.tunnel, state.link) {
            (ShellState::Authenticating, _, _) => Phase::ShellAuthenticating,
            (_, TunnelState::Active, _) => Phase::TunnelUp,
            (_, TunnelState::Establishing, _) => Phase::TunnelEstablishing,
            (_, _, LinkState::Up) => Phase::LinkUp,
            (_, _, LinkState::Connecting) => Phase::LinkConnecting,
            _ => Phase::Disconnected,
        }
    }

    /// Total bytes received from the shell since startup
    pub fn bytes_received(&self) -> u64 {
        self.shared.bytes.load(Ordering::Relaxed)
    }

    pub fn link_is_up(&self) -> bool {
        self.shared.link.lock().is_up()
    }

    pub fn local_addr(&self) -> Option<IpAddr> {
        self.shared.link.lock().local_addr()
    }

    /// Short link label for the status line
    pub fn link_label(&self) -> &'static str {
        if self.is_connecting() {
            "BUSY..."
        } else if self.link_is_up() {
            "ONLINE"
        } else {
            "OFFLINE"
        }
    }

    /// Close everything without user notification
    pub fn shutdown(&self) {
        let shared = &self.shared;
        if shared.running.swap(false, Ordering::SeqCst) {
            wait_for_receiver(shared, shared.config.timing.disconnect_grace());
            teardown(shared);
        }
    }
}

fn set_state(shared: &Shared, f: impl FnOnce(&mut SessionState)) {
    f(&mut shared.state.lock());
}

fn resolve_profile(shared: &Shared, name: &str) -> Result<Profile> {
    match shared.store.load_profile(name) {
        Ok(profile) => return Ok(profile),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => tracing::warn!("Failed to load profile {}: {}", name, e),
    }
    shared.config.fallback_profile(name).ok_or_else(|| {
        tracing::warn!("No stored or built-in profile named {}", name);
        SessionError::ProfileNotFound(name.to_string())
    })
}

fn link_credentials(shared: &Shared) -> Option<LinkCredentials> {
    match shared.store.load_link_credentials() {
        Ok(Some(creds)) => return Some(creds),
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to load link credentials: {}", e),
    }
    let link = &shared.config.link;
    link.fallback_ssid.as_ref().map(|ssid| LinkCredentials {
        ssid: ssid.clone(),
        password: link.fallback_password.clone().unwrap_or_default(),
    })
}

/// Join `creds.ssid` and poll until the link reports up
fn join_link(shared: &Shared, creds: &LinkCredentials) -> Result<()> {
    let timing = &shared.config.timing;
    set_state(shared, |s| s.link = LinkState::Connecting);
    tracing::info!("Joining network {}", creds.ssid);

    let started = shared.link.lock().begin(&creds.ssid, &creds.password);
    if started {
        for _ in 0..timing.link_attempts.max(1) {
            if shared.link.lock().is_up() {
                set_state(shared, |s| s.link = LinkState::Up);
                return Ok(());
            }
            thread::sleep(timing.link_retry());
        }
    }

    tracing::warn!("Link {} did not come up", creds.ssid);
    set_state(shared, |s| s.link = LinkState::Down);
    Err(SessionError::LinkUnavailable)
}

/// Make sure the link is up, auto-joining with known credentials
fn ensure_link(shared: &Shared) -> Result<()> {
    if shared.link.lock().is_up() {
        set_state(shared, |s| s.link = LinkState::Up);
        return Ok(());
    }
    let Some(creds) = link_credentials(shared) else {
        tracing::warn!("Link down and no credentials to join with");
        set_state(shared, |s| s.link = LinkState::Down);
        return Err(SessionError::LinkUnavailable);
    };
    shared.ui.line(&format!("Connecting to WiFi {}...", creds.ssid));
    join_link(shared, &creds)
}

fn tunnel_config(shared: &Shared) -> Result<TunnelConfig> {
    let stored = match shared.store.load_tunnel_config() {
        Ok(Some(stored)) => Some(stored),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Failed to load tunnel config: {}", e);
            None
        }
    }
    .or_else(|| shared.config.tunnel_fallback.clone())
    .filter(|t| !t.is_empty())
    .ok_or_else(|| SessionError::TunnelFailure("no tunnel configuration".to_string()))?;

    let config = TunnelConfig::from(&stored);
    if config.local_address.parse::<IpAddr>().is_err() {
        return Err(SessionError::TunnelFailure(format!(
            "invalid local address '{}'",
            config.local_address
        )));
    }
    Ok(config)
}

fn establish_tunnel(shared: &Shared) -> Result<()> {
    let timing = &shared.config.timing;
    shared.ui.text("\n[INIT] Requesting Secure Session...\n");

    let config = tunnel_config(shared)?;
    tracing::info!("Starting tunnel to {}:{}", config.endpoint_host, config.endpoint_port);
    if !shared.tunnel.lock().begin(&config) {
        return Err(SessionError::TunnelFailure("interface setup failed".to_string()));
    }
    // Only a tunnel that began is ended on abort
    set_state(shared, |s| s.tunnel = TunnelState::Establishing);

    shared.ui.line("Waiting for Handshake...");
    for attempt in 0..timing.tunnel_attempts.max(1) {
        if shared.tunnel.lock().is_ready() {
            tracing::info!("Tunnel ready after {} polls", attempt + 1);
            set_state(shared, |s| s.tunnel = TunnelState::Active);
            shared.ui.text("\n[SUCCESS] WireGuard Tunnel active.\n");
            return Ok(());
        }
        thread::sleep(timing.tunnel_retry());
    }

    tracing::warn!("Tunnel handshake timed out");
    Err(SessionError::TunnelTimeout)
}

fn open_shell(shared: &Arc<Shared>, profile: &Profile) -> Result<()> {
    set_state(shared, |s| {
        s.shell = ShellState::Authenticating;
        s.host = profile.host.clone();
        s.port = profile.port;
        s.user = profile.user.clone();
    });
    shared.ui.line("Negotiating SSH Handshake...");

    let target = ShellTarget {
        host: profile.host.clone(),
        port: profile.port,
        user: profile.user.clone(),
        secret: profile.secret.clone(),
    };
    shared
        .shell
        .lock()
        .open(&target, shared.config.timing.shell_timeout())?;

    set_state(shared, |s| s.shell = ShellState::Open);
    start_receiver(shared);
    tracing::info!("Shell open on {}@{}:{}", profile.user, profile.host, profile.port);
    shared.ui.line("SSH connected!");
    Ok(())
}

fn run_shell_attempt(shared: &Arc<Shared>, resolve: impl FnOnce(&Shared) -> Result<Profile>) {
    let mut host = None;
    let result = resolve(shared.as_ref()).and_then(|profile| {
        host = Some(profile.host.clone());
        ensure_link(shared)?;
        if profile.tunnel {
            establish_tunnel(shared)?;
        }
        open_shell(shared, &profile)
    });

    if let Err(err) = result {
        tracing::warn!("Connection attempt failed: {}", err);
        let tunnel_active = shared.state.lock().tunnel == TunnelState::Active;
        abort_attempt(shared, &err);
        shared.ui.line(&err.to_string());

        let shell_stage = matches!(
            err,
            SessionError::ConnectFailure(_) | SessionError::AuthFailure(_) | SessionError::ChannelOpenFailure(_)
        );
        if shell_stage {
            if let Some(hint) = host.as_deref().and_then(|h| network_hint(h, tunnel_active)) {
                shared.ui.line(hint);
            }
        }
    }
}

fn run_link_attempt(shared: &Arc<Shared>, ssid: &str, password: &str) {
    shared.ui.line(&format!("Connecting to WiFi {}...", ssid));
    let creds = LinkCredentials {
        ssid: ssid.to_string(),
        password: password.to_string(),
    };
    match join_link(shared, &creds) {
        Ok(()) => {
            if let Err(e) = shared.store.save_link_credentials(&creds) {
                tracing::warn!("Failed to save link credentials: {}", e);
            }
            let addr = shared
                .link
                .lock()
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string());
            shared.ui.line(&format!("WiFi connected. IP: {}", addr));
        }
        Err(err) => {
            shared.ui.line(&err.to_string());
        }
    }
}

/// Undo whatever a failed attempt left half open
fn abort_attempt(shared: &Shared, err: &SessionError) {
    shared.shell.lock().close();
    let tunnel = shared.state.lock().tunnel;
    if matches!(tunnel, TunnelState::Establishing | TunnelState::Active) {
        shared.tunnel.lock().end();
    }
    set_state(shared, |s| {
        s.reset();
        if matches!(err, SessionError::TunnelTimeout | SessionError::TunnelFailure(_)) {
            s.tunnel = TunnelState::Failed;
        }
    });
}

fn start_receiver(shared: &Arc<Shared>) {
    shared.running.store(true, Ordering::SeqCst);
    let receive_loop = ReceiveLoop::new(
        shared.shell.clone(),
        shared.running.clone(),
        shared.bytes.clone(),
        shared.ui.clone(),
        EscapeFilter::new(&shared.config.colors),
        &shared.config.timing,
    );

    let owner = shared.clone();
    let spawned = thread::Builder::new()
        .name("shell-rx".to_string())
        .spawn(move || {
            let exit = receive_loop.run();
            if exit != LoopExit::Stopped && owner.running.swap(false, Ordering::SeqCst) {
                tracing::info!("Remote closed the session: {:?}", exit);
                owner.ui.line("\nSSH disconnected.");
                teardown(&owner);
            }
        });

    match spawned {
        Ok(handle) => *shared.receiver.lock() = Some(handle),
        Err(e) => {
            tracing::error!("Failed to spawn receive loop: {}", e);
            shared.running.store(false, Ordering::SeqCst);
            teardown(shared);
        }
    }
}

fn wait_for_receiver(shared: &Shared, grace: Duration) {
    let Some(handle) = shared.receiver.lock().take() else {
        return;
    };
    if handle.thread().id() == thread::current().id() {
        return;
    }
    let deadline = Instant::now() + grace;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        tracing::debug!("Receive loop still running after grace period");
    }
}

/// Release the channel and the tunnel and reset the session fields
fn teardown(shared: &Shared) {
    shared.shell.lock().close();
    let tunnel = shared.state.lock().tunnel;
    if tunnel == TunnelState::Active {
        shared.tunnel.lock().end();
    }
    set_state(shared, SessionState::reset);
}

/// Suggest why a private or overlay address might be unreachable
pub fn network_hint(host: &str, tunnel_active: bool) -> Option<&'static str> {
    if tunnel_active {
        return None;
    }
    let ip: Ipv4Addr = host.parse().ok()?;
    let [a, b, _, _] = ip.octets();
    if a == 100 && (64..128).contains(&b) {
        Some("Hint: 100.x addresses live on an overlay network (Tailscale). Plain WiFi cannot reach them.")
    } else if a == 192 && b == 168 {
        Some("Hint: 192.168.x is a local address. Make sure you are on the same WiFi as the host.")
    } else if a == 10 || (a == 172 && (16..32).contains(&b)) {
        Some("Hint: private address. Use the remote profile so the tunnel comes up first.")
    } else {
        None
    }
}
