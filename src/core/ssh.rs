//! `ssh2` shell transport
//!
//! Password authentication, a `vt100` PTY of 80x24 and an interactive shell.
//! The session is switched to non-blocking mode once the shell is up so the
//! receive loop can poll it.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::transport::{ReadOutcome, Result, ShellTarget, ShellTransport, TransportError};

const PTY_TERM: &str = "vt100";
const PTY_COLS: u32 = 80;
const PTY_ROWS: u32 = 24;

struct Connection {
    session: ssh2::Session,
    channel: ssh2::Channel,
}

/// Shell channel over `ssh2`
#[derive(Default)]
pub struct SshShell {
    conn: Option<Connection>,
}

impl SshShell {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect(target: &ShellTarget, timeout: Duration) -> Result<Connection> {
        let connect_err = |reason: String| TransportError::Connect {
            host: target.host.clone(),
            port: target.port,
            reason,
        };

        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("no address".to_string()))?;
        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| connect_err(e.to_string()))?;

        let mut session = ssh2::Session::new().map_err(|e| connect_err(e.to_string()))?;
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| connect_err(e.to_string()))?;

        if session.userauth_password(&target.user, &target.secret).is_err() || !session.authenticated() {
            return Err(TransportError::Auth(target.user.clone()));
        }

        let channel_err = |e: ssh2::Error| TransportError::Channel(e.to_string());
        let mut channel = session.channel_session().map_err(channel_err)?;
        channel
            .request_pty(PTY_TERM, None, Some((PTY_COLS, PTY_ROWS, 0, 0)))
            .map_err(channel_err)?;
        channel.shell().map_err(channel_err)?;

        session.set_blocking(false);
        Ok(Connection { session, channel })
    }
}

impl ShellTransport for SshShell {
    fn open(&mut self, target: &ShellTarget, timeout: Duration) -> Result<()> {
        self.close();
        self.conn = Some(Self::connect(target, timeout)?);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let conn = self.conn.as_mut().ok_or(TransportError::NotOpen)?;
        // Writes are short; do them blocking so nothing is lost
        conn.session.set_blocking(true);
        let result = conn.channel.write_all(data).and_then(|_| conn.channel.flush());
        conn.session.set_blocking(false);
        result.map(|_| data.len()).map_err(TransportError::Write)
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let Some(conn) = self.conn.as_mut() else {
            return ReadOutcome::Error("channel is not open".to_string());
        };
        match conn.channel.read(buf) {
            Ok(0) if conn.channel.eof() => ReadOutcome::Eof,
            Ok(0) => ReadOutcome::Empty,
            Ok(n) => ReadOutcome::Data(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => ReadOutcome::Empty,
            Err(e) => ReadOutcome::Error(e.to_string()),
        }
    }

    fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.session.set_blocking(true);
            let _ = conn.channel.close();
            let _ = conn.session.disconnect(None, "bye", None);
        }
    }
}
