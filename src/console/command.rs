//! Local command grammar

use crate::core::session::SessionError;
use crate::store::{Profile, StoredTunnel};

pub const USAGE_CONNECT: &str = "Usage: connect <SSID> <PASSWORD>";
pub const USAGE_SSH: &str = "Usage: ssh <HOST> <PORT> <USER> <PASS>";
pub const USAGE_SAVE: &str = "Usage: save <local|remote> <host> <port> <user> <pass>";
pub const USAGE_SAVE_WG: &str = "Usage: save wg <priv> <pub> <end:port> <ip>";

/// Name given to profiles built by `ssh`
pub const MANUAL_PROFILE: &str = "manual";

/// A parsed local command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Join a wireless network
    Connect { ssid: String, password: String },
    /// Open a shell with ad-hoc parameters
    Ssh(Profile),
    SaveProfile(Profile),
    SaveTunnel(StoredTunnel),
    /// Drop the wireless link
    Disconnect,
    /// Close the shell session
    Exit,
    Clear,
    /// Show the launcher
    Home,
    Help,
    Info,
    Unknown(String),
}

impl Command {
    /// Parse a submitted line. Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, SessionError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = words.split_first() else {
            return Ok(None);
        };

        let cmd = match head {
            "connect" => parse_connect(line)?,
            "ssh" => match args {
                [host, port, user, pass] => {
                    let port = parse_port(port, USAGE_SSH)?;
                    let mut profile = Profile::new(MANUAL_PROFILE, host, port, user, pass);
                    profile.tunnel = false;
                    Command::Ssh(profile)
                }
                _ => return Err(SessionError::MalformedCommand(USAGE_SSH)),
            },
            // `save wg` is matched before the generic `save`
            "save" if args.first() == Some(&"wg") => match &args[1..] {
                [private_key, public_key, endpoint, local_ip] => Command::SaveTunnel(StoredTunnel {
                    private_key: private_key.to_string(),
                    public_key: public_key.to_string(),
                    endpoint: endpoint.to_string(),
                    local_ip: local_ip.to_string(),
                }),
                _ => return Err(SessionError::MalformedCommand(USAGE_SAVE_WG)),
            },
            "save" => match args {
                [name, host, port, user, pass] => {
                    let port = parse_port(port, USAGE_SAVE)?;
                    Command::SaveProfile(Profile::new(name, host, port, user, pass))
                }
                _ => return Err(SessionError::MalformedCommand(USAGE_SAVE)),
            },
            "disconnect" if args.is_empty() => Command::Disconnect,
            "exit" if args.is_empty() => Command::Exit,
            "clear" if args.is_empty() => Command::Clear,
            "settings" | "home" if args.is_empty() => Command::Home,
            "help" if args.is_empty() => Command::Help,
            "neofetch" | "info" if args.is_empty() => Command::Info,
            _ => Command::Unknown(line.trim().to_string()),
        };
        Ok(Some(cmd))
    }

    /// Whether the submitted line goes into history
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Command::Home)
    }
}

/// `connect <ssid> <password>`; the password is the rest of the line and may
/// contain spaces
fn parse_connect(line: &str) -> Result<Command, SessionError> {
    let rest = line.trim().strip_prefix("connect").unwrap_or_default().trim_start();
    let (ssid, password) = rest
        .split_once(char::is_whitespace)
        .map(|(ssid, password)| (ssid, password.trim()))
        .filter(|(_, password)| !password.is_empty())
        .ok_or(SessionError::MalformedCommand(USAGE_CONNECT))?;
    Ok(Command::Connect {
        ssid: ssid.to_string(),
        password: password.to_string(),
    })
}

fn parse_port(port: &str, usage: &'static str) -> Result<u16, SessionError> {
    port.parse()
        .ok()
        .filter(|p| *p != 0)
        .ok_or(SessionError::MalformedCommand(usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    fn usage(line: &str) -> &'static str {
        match Command::parse(line) {
            Err(SessionError::MalformedCommand(u)) => u,
            other => panic!("expected usage error for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_connect_password_keeps_spaces() {
        assert_eq!(
            parse("connect HomeNet my secret pass"),
            Command::Connect {
                ssid: "HomeNet".into(),
                password: "my secret pass".into(),
            }
        );
        assert_eq!(
            parse("  connect\tCafe  two  words "),
            Command::Connect {
                ssid: "Cafe".into(),
                password: "two  words".into(),
            }
        );
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_connect() {
        assert_eq!(
            parse("connect home secret"),
            Command::Connect {
                ssid: "home".into(),
                password: "secret".into()
            }
        );
        assert_eq!(usage("connect home"), USAGE_CONNECT);
        assert_eq!(usage("connect home   "), USAGE_CONNECT);
        assert_eq!(usage("connect"), USAGE_CONNECT);
    }

    #[test]
    fn test_ssh_builds_manual_profile_without_tunnel() {
        match parse("ssh 10.0.0.5 2222 pi raspberry") {
            Command::Ssh(p) => {
                assert_eq!(p.host, "10.0.0.5");
                assert_eq!(p.port, 2222);
                assert_eq!(p.user, "pi");
                assert_eq!(p.secret, "raspberry");
                assert!(!p.tunnel);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(usage("ssh host 22 user"), USAGE_SSH);
        assert_eq!(usage("ssh host port user pass"), USAGE_SSH);
    }

    #[test]
    fn test_save_wg_matched_before_save() {
        match parse("save wg priv pub 188.70.11.115:51820 10.0.0.2") {
            Command::SaveTunnel(t) => {
                assert_eq!(t.endpoint, "188.70.11.115:51820");
                assert_eq!(t.local_ip, "10.0.0.2");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(usage("save wg priv pub"), USAGE_SAVE_WG);
    }

    #[test]
    fn test_save_profile() {
        assert_eq!(
            parse("save local h 22 u p"),
            Command::SaveProfile(Profile::new("local", "h", 22, "u", "p"))
        );
        match parse("save remote 10.0.0.1 22 u p") {
            Command::SaveProfile(p) => assert!(p.tunnel),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(usage("save local h 22 u"), USAGE_SAVE);
    }

    #[test]
    fn test_exact_commands() {
        assert_eq!(parse("disconnect"), Command::Disconnect);
        assert_eq!(parse("exit"), Command::Exit);
        assert_eq!(parse("clear"), Command::Clear);
        assert_eq!(parse("settings"), Command::Home);
        assert_eq!(parse("home"), Command::Home);
        assert_eq!(parse("help"), Command::Help);
        assert_eq!(parse("neofetch"), Command::Info);
        assert_eq!(parse("info"), Command::Info);
        assert_eq!(parse("exit now"), Command::Unknown("exit now".into()));
        assert_eq!(parse("ls -la"), Command::Unknown("ls -la".into()));
    }

    #[test]
    fn test_home_is_not_recorded() {
        assert!(!Command::Home.is_recorded());
        assert!(Command::Help.is_recorded());
        assert!(Command::Unknown("x".into()).is_recorded());
    }
}
