//! pagerterm - a pocket SSH terminal
//!
//! pagerterm joins a network link, optionally brings up a WireGuard style
//! tunnel and opens an interactive shell on a remote host. Shell output is
//! cleaned of VT escape sequences and shown with inline color markers.
//!
//! # Quick Start
//!
//! ```text
//! pagerterm                    # Start at the command prompt
//! pagerterm --profile local    # Connect to the stored "local" profile
//! ```
//!
//! # Commands
//!
//! | Command | Action |
//! |---------|--------|
//! | connect SSID PASS | Join a WiFi network |
//! | ssh HOST PORT USER PASS | Open a shell directly |
//! | save NAME HOST PORT USER PASS | Store a profile |
//! | save wg PRIV PUB END:PORT IP | Store tunnel parameters |
//! | exit | Close the shell |
//! | home | Open the launcher |

mod config;
mod console;
mod core;
mod hal;
mod history;
mod store;
mod ui;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::console::{Console, KeyOutcome};
use crate::core::net::host_drivers;
use crate::core::pool::MessagePool;
use crate::core::session::Session;
use crate::hal::{Hal, HostHardware};
use crate::history::CommandHistory;
use crate::store::{ProfileStore, TomlStore};
use crate::ui::{render_queue, Focus, Key, KeyMapper, RenderQueue, Renderer, Transcript, UiHandle};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lines moved per PageUp/PageDown
const PAGE_LINES: isize = 10;

/// Command line options
#[derive(Debug, Default)]
struct Options {
    config_path: Option<PathBuf>,
    store_path: Option<PathBuf>,
    profile: Option<String>,
    write_config: bool,
}

fn print_version() {
    eprintln!("pagerterm {}", VERSION);
}

fn print_help() {
    eprintln!("pagerterm {} - pocket SSH terminal", VERSION);
    eprintln!();
    eprintln!("Usage: pagerterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Configuration file (default ~/.pagerterm/config.toml)");
    eprintln!("  --store <PATH>        Profile store (default ~/.pagerterm/store.toml)");
    eprintln!("  --profile <NAME>      Connect to a profile at startup");
    eprintln!("  --write-config        Write the default configuration and exit");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Enter                 Run the command or send the line to the shell");
    eprintln!("  Up/Down               Browse history (arrows go to the shell when open)");
    eprintln!("  Delete                Remove the selected history entry");
    eprintln!("  PageUp/PageDown       Scroll the output");
    eprintln!("  Ctrl+C, Ctrl+D        Sent to the shell");
    eprintln!("  Ctrl+Q, F10           Quit");
    eprintln!();
    eprintln!("Logging: ~/.pagerterm/pagerterm.log (level from PAGERTERM_LOG or log_level)");
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).ok_or("Missing config path")?;
                options.config_path = Some(PathBuf::from(path));
            }
            "--store" => {
                i += 1;
                let path = args.get(i).ok_or("Missing store path")?;
                options.store_path = Some(PathBuf::from(path));
            }
            "--profile" => {
                i += 1;
                let name = args.get(i).ok_or("Missing profile name")?;
                options.profile = Some(name.clone());
            }
            "--write-config" => {
                options.write_config = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

/// Route logs to `~/.pagerterm/pagerterm.log`; stdout belongs to the screen
fn init_logging(level: &str) {
    let log_path = config::app_dir()
        .map(|dir| dir.join("pagerterm.log"))
        .unwrap_or_else(|| PathBuf::from("pagerterm.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("PAGERTERM_LOG")
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = match &options.config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    if options.write_config {
        config
            .save()
            .map_err(anyhow::Error::msg)
            .context("Failed to write default configuration")?;
        eprintln!("Configuration written to ~/.pagerterm/config.toml");
        return Ok(());
    }

    if let Some(path) = options.store_path.clone() {
        config.store_path = Some(path);
    }

    init_logging(&config.log_level);
    info!("pagerterm {} starting...", VERSION);

    run_terminal(config, options.profile)
}

/// Wire the components together and run until the user quits
fn run_terminal(config: Config, profile: Option<String>) -> anyhow::Result<()> {
    let store: Arc<dyn ProfileStore> = match config.store_path() {
        Some(path) => Arc::new(
            TomlStore::open(&path).with_context(|| format!("Failed to open store {}", path.display()))?,
        ),
        None => {
            warn!("No home directory, profiles will not be saved");
            Arc::new(TomlStore::in_memory())
        }
    };
    let config = Arc::new(config);

    let pool = MessagePool::new(config.pool.size, config.pool.message_capacity);
    let (ui, queue) = render_queue(pool, config.pool.queue_depth);
    let hal = Hal::new(Box::new(HostHardware::new()));
    let session = Session::new(host_drivers(), Arc::clone(&store), ui.clone(), Arc::clone(&config));

    let history = CommandHistory::load(store.as_ref());
    let mut console = Console::new(session.clone(), Arc::clone(&store), ui.clone(), hal.clone(), history);

    let mut transcript = Transcript::new(config.transcript.cap, config.transcript.keep);
    if config.transcript.persist {
        match store.load_transcript() {
            Ok(text) => transcript.push(&text),
            Err(e) => warn!("Failed to restore transcript: {}", e),
        }
    }
    let mut renderer = Renderer::new(transcript);

    // Initialize renderer and run with guaranteed cleanup
    renderer.init().context("Failed to initialize terminal")?;
    if renderer.transcript().is_empty() {
        ui.line("pagerterm ready. Type 'help' for commands.");
    }
    console.refresh_status();
    if let Some(name) = profile {
        console.launch(&name);
    }

    let result = run_main_loop(&mut console, &mut renderer, &queue, &ui, &hal, &config);
    if let Err(e) = &result {
        error!("Main loop failed: {}", e);
    }

    session.shutdown();
    // Pick up the last lines posted during shutdown
    queue.drain(&mut renderer, hal.critical_section());

    if let Err(e) = console.history_mut().save(store.as_ref()) {
        warn!("Failed to save history: {}", e);
    }
    if config.transcript.persist {
        if let Err(e) = store.save_transcript(renderer.transcript().as_str()) {
            warn!("Failed to save transcript: {}", e);
        }
    }

    let _ = renderer.cleanup();
    info!("pagerterm exiting");
    result
}

fn run_main_loop(
    console: &mut Console,
    renderer: &mut Renderer,
    queue: &RenderQueue,
    ui: &UiHandle,
    hal: &Hal,
    config: &Config,
) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(16);
    let status_interval = config.timing.status_interval();
    let mut last_status = Instant::now();

    loop {
        if event::poll(poll_timeout)? {
            match event::read()? {
                Event::Key(key_event) => {
                    let Some(key) = KeyMapper::map(&key_event) else {
                        continue;
                    };
                    if key == Key::Quit {
                        info!("Quit requested");
                        break;
                    }
                    match renderer.current_focus() {
                        Focus::Launcher => match key {
                            Key::Up => renderer.launcher_move(-1),
                            Key::Down => renderer.launcher_move(1),
                            Key::Enter => console.launch(renderer.launcher_selection()),
                            Key::Escape => {
                                ui.focus(Focus::Terminal);
                            }
                            _ => {}
                        },
                        Focus::Terminal => match key {
                            Key::PageUp => renderer.scroll_by(PAGE_LINES),
                            Key::PageDown => renderer.scroll_by(-PAGE_LINES),
                            _ => {
                                if console.handle_key(key) == KeyOutcome::Quit {
                                    break;
                                }
                            }
                        },
                    }
                }
                Event::Resize(_, _) => renderer.invalidate(),
                _ => {}
            }
        }

        if last_status.elapsed() >= status_interval {
            console.refresh_status();
            last_status = Instant::now();
        }

        queue.drain(renderer, hal.critical_section());
        renderer.draw()?;
    }

    Ok(())
}
