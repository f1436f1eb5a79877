//! Command interpreter
//!
//! Owns the input line and the history. While a shell is open, submitted
//! lines and special keys go to the remote side; otherwise lines are parsed
//! as local commands.

pub mod command;
pub mod input;

use std::sync::Arc;

use crate::core::receiver::format_bytes;
use crate::core::session::{Session, SessionError};
use crate::hal::{Hal, EFFECT_CLICK, EFFECT_CONFIRM};
use crate::history::CommandHistory;
use crate::store::ProfileStore;
use crate::ui::keymapper::Key;
use crate::ui::surface::{Focus, UiHandle};

pub use command::Command;
pub use input::InputLine;

const HELP_TEXT: &str = "\
Commands:
  connect <SSID> <PASSWORD>        join a WiFi network
  ssh <HOST> <PORT> <USER> <PASS>  open a shell directly
  save <local|remote> <host> <port> <user> <pass>
  save wg <priv> <pub> <end:port> <ip>
  disconnect                       drop WiFi
  exit                             close the SSH session
  clear                            clear the screen
  settings | home                  open the launcher
  neofetch | info                  system information
  help                             this text
Keys: Up/Down browse history, Del deletes the entry,
      Ctrl+C/Ctrl+D/Tab/Esc/arrows go to the shell, Ctrl+Q quits
";

/// What the caller should do after a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Ignored,
    Quit,
}

/// Local command interpreter bound to one session
pub struct Console {
    input: InputLine,
    history: CommandHistory,
    session: Session,
    store: Arc<dyn ProfileStore>,
    ui: UiHandle,
    hal: Hal,
}

impl Console {
    pub fn new(
        session: Session,
        store: Arc<dyn ProfileStore>,
        ui: UiHandle,
        hal: Hal,
        history: CommandHistory,
    ) -> Self {
        Self {
            input: InputLine::new(),
            history,
            session,
            store,
            ui,
            hal,
        }
    }

    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut CommandHistory {
        &mut self.history
    }

    /// Handle one key from the terminal view
    pub fn handle_key(&mut self, key: Key) -> KeyOutcome {
        if key == Key::Quit {
            return KeyOutcome::Quit;
        }
        self.hal.vibrate(EFFECT_CLICK);

        if self.session.is_open() {
            if let Some(bytes) = key.shell_bytes() {
                self.session.write(&bytes);
                return KeyOutcome::Handled;
            }
        }

        let outcome = match key {
            Key::Enter => {
                self.submit();
                return KeyOutcome::Handled;
            }
            Key::Char(ch) => self.input.insert(ch),
            Key::Backspace => self.input.backspace(),
            Key::Up => {
                self.history.navigate(1, &mut self.input);
                true
            }
            Key::Down => {
                self.history.navigate(-1, &mut self.input);
                true
            }
            Key::Delete => {
                if self.history.delete_current(&mut self.input) {
                    self.ui.line("[History entry deleted]");
                    true
                } else {
                    self.input.backspace()
                }
            }
            _ => false,
        };

        if outcome {
            self.ui.input(self.input.as_str());
            KeyOutcome::Handled
        } else {
            KeyOutcome::Ignored
        }
    }

    /// Submit the input line
    pub fn submit(&mut self) {
        let line = self.input.take();
        self.history.reset_cursor();
        self.ui.input("");

        if self.session.is_open() {
            self.session.write(format!("{}\n", line).as_bytes());
            self.history.record(&line);
            return;
        }

        match Command::parse(&line) {
            Ok(Some(cmd)) => {
                self.ui.line(&format!("> {}", line.trim()));
                if cmd.is_recorded() {
                    self.history.record(&line);
                }
                self.dispatch(cmd);
            }
            Ok(None) => {}
            Err(err) => {
                self.ui.line(&err.to_string());
            }
        }
        self.ui.scroll_to_end();
    }

    fn dispatch(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { ssid, password } => {
                self.report(self.session.connect_link(&ssid, &password));
            }
            Command::Ssh(profile) => {
                self.report(self.session.connect_with(profile));
            }
            Command::SaveProfile(profile) => match self.store.save_profile(&profile) {
                Ok(()) => {
                    self.ui.line(&format!("Profile [{}] saved.", profile.name));
                }
                Err(e) => {
                    tracing::warn!("Failed to save profile {}: {}", profile.name, e);
                    self.ui.line(&format!("[ERROR] Could not save profile: {}", e));
                }
            },
            Command::SaveTunnel(tunnel) => match self.store.save_tunnel_config(&tunnel) {
                Ok(()) => {
                    self.ui.line("WireGuard config saved.");
                }
                Err(e) => {
                    tracing::warn!("Failed to save tunnel config: {}", e);
                    self.ui.line(&format!("[ERROR] Could not save tunnel config: {}", e));
                }
            },
            Command::Disconnect => self.session.link_disconnect(),
            Command::Exit => self.session.disconnect(),
            Command::Clear => {
                self.ui.clear();
            }
            Command::Home => {
                self.ui.focus(Focus::Launcher);
            }
            Command::Help => {
                self.ui.text(HELP_TEXT);
            }
            Command::Info => {
                self.ui.text(&self.info_banner());
            }
            Command::Unknown(_) => {
                self.ui.line("Unknown command. Type 'help'");
            }
        }
    }

    /// Connect to a launcher entry and return to the terminal view
    pub fn launch(&mut self, profile: &str) {
        self.hal.vibrate(EFFECT_CONFIRM);
        self.ui.focus(Focus::Terminal);
        self.report(self.session.connect(profile));
    }

    fn report(&self, result: Result<(), SessionError>) {
        if let Err(e) = result {
            self.ui.line(&e.to_string());
        }
    }

    /// Push a fresh status line
    pub fn refresh_status(&self) {
        let _guard = self.hal.enter();
        let battery = self.hal.battery();
        let state = self.session.state();
        let shell = if self.session.is_open() {
            format!("SSH {}@{}", state.user, state.host)
        } else {
            "SSH --".to_string()
        };
        self.ui.status(&format!("{} | {} | {}", battery.label(), self.session.link_label(), shell));
    }

    fn info_banner(&self) -> String {
        let pool = self.ui.pool();
        let state = self.session.state();
        let addr = self
            .session
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        let shell = if self.session.is_open() {
            format!("{}@{}:{}", state.user, state.host, state.port)
        } else {
            "none".to_string()
        };

        format!(
            "\n  {} {}\n  ------------------\n  Link:    {} ({})\n  Session: {} [{:?}]\n  Battery: {}\n  Pool:    {}/{} in use, {} dropped\n  RX:      {}\n\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            self.session.link_label(),
            addr,
            shell,
            self.session.phase(),
            self.hal.battery().label(),
            pool.outstanding(),
            pool.size(),
            pool.dropped(),
            format_bytes(self.session.bytes_received()),
        )
    }
}
