//! Key mapping for console input
//!
//! Converts crossterm key events to console keys, and console keys to the
//! VT byte sequences written to an open shell.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// A key as the console sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    /// Ctrl + letter
    Ctrl(char),
    Enter,
    Backspace,
    Delete,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    /// Leave the application
    Quit,
}

impl Key {
    /// Bytes sent straight to an open shell, bypassing the input line
    pub fn shell_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Key::Ctrl(ch) => ctrl_byte(*ch).map(|b| vec![b]),
            Key::Tab => Some(vec![0x09]),
            Key::Escape => Some(vec![0x1B]),
            Key::Up => Some(b"\x1b[A".to_vec()),
            Key::Down => Some(b"\x1b[B".to_vec()),
            Key::Right => Some(b"\x1b[C".to_vec()),
            Key::Left => Some(b"\x1b[D".to_vec()),
            _ => None,
        }
    }
}

/// Control code for Ctrl + `ch`
fn ctrl_byte(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' => Some(ch as u8 - b'a' + 1),
        'A'..='Z' => Some(ch as u8 - b'A' + 1),
        '@' | ' ' => Some(0x00),
        '[' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' => Some(0x1D),
        _ => None,
    }
}

/// Key mapper for converting key events to console keys
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent. Releases and unmapped keys yield `None`.
    pub fn map(event: &KeyEvent) -> Option<Key> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let mods = Modifiers::from(event.modifiers);

        match event.code {
            KeyCode::Char('q') | KeyCode::Char('Q') if mods.contains(Modifiers::CTRL) => Some(Key::Quit),
            KeyCode::Char(ch) if mods.contains(Modifiers::CTRL) && !mods.contains(Modifiers::ALT) => {
                ctrl_byte(ch).map(|_| Key::Ctrl(ch.to_ascii_lowercase()))
            }
            KeyCode::Char(ch) => Some(Key::Char(ch)),
            KeyCode::Enter => Some(Key::Enter),
            KeyCode::Backspace => Some(Key::Backspace),
            KeyCode::Delete => Some(Key::Delete),
            KeyCode::Tab => Some(Key::Tab),
            KeyCode::Esc => Some(Key::Escape),
            KeyCode::Up => Some(Key::Up),
            KeyCode::Down => Some(Key::Down),
            KeyCode::Left => Some(Key::Left),
            KeyCode::Right => Some(Key::Right),
            KeyCode::PageUp => Some(Key::PageUp),
            KeyCode::PageDown => Some(Key::PageDown),
            KeyCode::F(10) => Some(Key::Quit),
            _ => None,
        }
    }
}
