//! Escape sequence filter
//!
//! Turns raw shell output into text the render surface can display directly.
//! SGR color codes become inline color markers, every other CSI sequence and
//! all OSC strings are dropped. Scanner state survives between calls, so a
//! sequence split across two received chunks is still recognized.
//!
//! Markup produced by the filter:
//!
//! ```text
//! #RRGGBB <text>   start of a colored span
//! #/               end of the colored span (reset)
//! ##               a literal '#'
//! ```

use serde::{Deserialize, Serialize};

/// Markup escape character shared with the renderer
pub const MARKUP_CHAR: char = '#';

/// Marker that ends a colored span
pub const RESET_MARKER: &str = "#/";

/// Longest CSI parameter string kept; longer sequences are consumed and dropped
const MAX_PARAMS: usize = 32;

/// The six basic colors the filter recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicColor {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

impl BasicColor {
    /// Map an SGR foreground code (31..=36) to a color
    pub fn from_sgr(code: u16) -> Option<Self> {
        match code {
            31 => Some(Self::Red),
            32 => Some(Self::Green),
            33 => Some(Self::Yellow),
            34 => Some(Self::Blue),
            35 => Some(Self::Magenta),
            36 => Some(Self::Cyan),
            _ => None,
        }
    }
}

/// Hex colors emitted for each basic color
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerPalette {
    pub red: String,
    pub green: String,
    pub yellow: String,
    pub blue: String,
    pub magenta: String,
    pub cyan: String,
}

impl Default for MarkerPalette {
    fn default() -> Self {
        Self {
            red: "FF3333".to_string(),
            green: "00FF66".to_string(),
            yellow: "FFFF00".to_string(),
            blue: "3366FF".to_string(),
            magenta: "FF33FF".to_string(),
            cyan: "33FFFF".to_string(),
        }
    }
}

impl MarkerPalette {
    fn hex(&self, color: BasicColor) -> &str {
        match color {
            BasicColor::Red => &self.red,
            BasicColor::Green => &self.green,
            BasicColor::Yellow => &self.yellow,
            BasicColor::Blue => &self.blue,
            BasicColor::Magenta => &self.magenta,
            BasicColor::Cyan => &self.cyan,
        }
    }

    /// Opening marker for `color`, e.g. `"#FF3333 "`
    pub fn marker(&self, color: BasicColor) -> String {
        format!("{}{} ", MARKUP_CHAR, self.hex(color))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum ScanState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    Csi,
    Osc,
    EscapeInOsc,
}

/// Partially received UTF-8 character
#[derive(Default)]
struct Utf8Pending {
    bytes: [u8; 4],
    len: usize,
    expected: usize,
}

/// Resumable ANSI/VT output filter
pub struct EscapeFilter {
    state: ScanState,
    params: String,
    params_overflow: bool,
    csi_intermediate: bool,
    utf8: Utf8Pending,
    markers: [String; 6],
}

impl Default for EscapeFilter {
    fn default() -> Self {
        Self::new(&MarkerPalette::default())
    }
}

impl EscapeFilter {
    pub fn new(palette: &MarkerPalette) -> Self {
        Self {
            state: ScanState::Ground,
            params: String::with_capacity(MAX_PARAMS),
            params_overflow: false,
            csi_intermediate: false,
            utf8: Utf8Pending::default(),
            markers: [
                palette.marker(BasicColor::Red),
                palette.marker(BasicColor::Green),
                palette.marker(BasicColor::Yellow),
                palette.marker(BasicColor::Blue),
                palette.marker(BasicColor::Magenta),
                palette.marker(BasicColor::Cyan),
            ],
        }
    }

    /// Filter one chunk and return the cleaned fragment
    pub fn filter(&mut self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() + bytes.len() / 2);
        self.filter_into(bytes, &mut out);
        out
    }

    /// Filter one chunk, appending the cleaned fragment to `out`
    pub fn filter_into(&mut self, bytes: &[u8], out: &mut String) {
        for &byte in bytes {
            match self.state {
                ScanState::Ground => self.ground(byte, out),
                ScanState::Escape => self.escape(byte),
                ScanState::EscapeIntermediate => self.escape_intermediate(byte),
                ScanState::Csi => self.csi(byte, out),
                ScanState::Osc => self.osc(byte),
                ScanState::EscapeInOsc => self.escape_in_osc(byte),
            }
        }
    }

    /// True when no sequence or character is partially scanned
    pub fn is_idle(&self) -> bool {
        self.state == ScanState::Ground && self.utf8.len == 0
    }

    /// Forget any partially scanned sequence
    pub fn reset(&mut self) {
        self.state = ScanState::Ground;
        self.params.clear();
        self.params_overflow = false;
        self.csi_intermediate = false;
        self.utf8 = Utf8Pending::default();
    }

    fn enter_escape(&mut self) {
        self.state = ScanState::Escape;
        self.params.clear();
        self.params_overflow = false;
        self.csi_intermediate = false;
    }

    fn ground(&mut self, byte: u8, out: &mut String) {
        if self.utf8.len > 0 || byte >= 0x80 {
            self.utf8_byte(byte, out);
            return;
        }

        match byte {
            0x1B => self.enter_escape(),
            b'\r' => {}
            b'\n' | b'\t' => out.push(byte as char),
            b'#' => {
                out.push(MARKUP_CHAR);
                out.push(MARKUP_CHAR);
            }
            0x20..=0x7E => out.push(byte as char),
            // Remaining C0 controls and DEL have no meaning for a label
            _ => {}
        }
    }

    fn utf8_byte(&mut self, byte: u8, out: &mut String) {
        if self.utf8.len > 0 {
            if (0x80..=0xBF).contains(&byte) {
                self.utf8.bytes[self.utf8.len] = byte;
                self.utf8.len += 1;
                if self.utf8.len == self.utf8.expected {
                    match std::str::from_utf8(&self.utf8.bytes[..self.utf8.len]) {
                        Ok(s) => out.push_str(s),
                        Err(_) => out.push(char::REPLACEMENT_CHARACTER),
                    }
                    self.utf8 = Utf8Pending::default();
                }
                return;
            }
            // Truncated sequence: replace it and rescan this byte
            out.push(char::REPLACEMENT_CHARACTER);
            self.utf8 = Utf8Pending::default();
            self.ground(byte, out);
            return;
        }

        let expected = if byte & 0xE0 == 0xC0 {
            2
        } else if byte & 0xF0 == 0xE0 {
            3
        } else if byte & 0xF8 == 0xF0 {
            4
        } else {
            0
        };

        if expected == 0 {
            out.push(char::REPLACEMENT_CHARACTER);
        } else {
            self.utf8.bytes[0] = byte;
            self.utf8.len = 1;
            self.utf8.expected = expected;
        }
    }

    fn escape(&mut self, byte: u8) {
        match byte {
            b'[' => self.state = ScanState::Csi,
            b']' => self.state = ScanState::Osc,
            0x1B => self.enter_escape(),
            0x20..=0x2F => self.state = ScanState::EscapeIntermediate,
            // Single-character escapes (cursor save/restore, index, reset...)
            _ => self.state = ScanState::Ground,
        }
    }

    fn escape_intermediate(&mut self, byte: u8) {
        match byte {
            0x1B => self.enter_escape(),
            0x20..=0x2F => {}
            _ => self.state = ScanState::Ground,
        }
    }

    fn csi(&mut self, byte: u8, out: &mut String) {
        match byte {
            0x30..=0x3F => {
                if self.params.len() < MAX_PARAMS {
                    self.params.push(byte as char);
                } else {
                    self.params_overflow = true;
                }
            }
            0x20..=0x2F => self.csi_intermediate = true,
            0x40..=0x7E => {
                if byte == b'm' && !self.csi_intermediate && !self.params_overflow {
                    self.apply_sgr(out);
                }
                self.state = ScanState::Ground;
            }
            0x1B => self.enter_escape(),
            // CAN and SUB abort the sequence
            0x18 | 0x1A => self.state = ScanState::Ground,
            _ => {}
        }
    }

    fn apply_sgr(&mut self, out: &mut String) {
        if self.params.is_empty() {
            out.push_str(RESET_MARKER);
            return;
        }

        for part in self.params.split(';') {
            match part {
                "" | "0" | "39" => out.push_str(RESET_MARKER),
                _ => {
                    if let Some(color) = part.parse::<u16>().ok().and_then(BasicColor::from_sgr) {
                        out.push_str(&self.markers[color as usize]);
                    }
                }
            }
        }
    }

    fn osc(&mut self, byte: u8) {
        match byte {
            0x07 => self.state = ScanState::Ground,
            0x1B => self.state = ScanState::EscapeInOsc,
            _ => {}
        }
    }

    fn escape_in_osc(&mut self, byte: u8) {
        if byte == b'\\' {
            self.state = ScanState::Ground;
        } else {
            // Not a string terminator: the OSC ended and a new escape began
            self.enter_escape();
            self.escape(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(input: &[u8]) -> String {
        EscapeFilter::default().filter(input)
    }

    #[test]
    fn test_red_and_reset_markers() {
        assert_eq!(filter(b"A\x1B[31mB\x1B[0mC"), "A#FF3333 B#/C");
    }

    #[test]
    fn test_all_basic_colors() {
        let out = filter(b"\x1b[32mg\x1b[33my\x1b[34mb\x1b[35mm\x1b[36mc\x1b[m");
        assert_eq!(out, "#00FF66 g#FFFF00 y#3366FF b#FF33FF m#33FFFF c#/");
    }

    #[test]
    fn test_compound_sgr_keeps_color() {
        assert_eq!(filter(b"\x1b[1;31mX\x1b[0m"), "#FF3333 X#/");
        assert_eq!(filter(b"\x1b[0;36mX"), "#/#33FFFF X");
    }

    #[test]
    fn test_other_csi_sequences_are_dropped() {
        assert_eq!(filter(b"a\x1b[2Jb\x1b[10;5Hc\x1b[?25ld\x1b[3~e"), "abcde");
        // Unsupported SGR codes leave no trace
        assert_eq!(filter(b"x\x1b[1my\x1b[38;5;200mz"), "xyz");
    }

    #[test]
    fn test_osc_is_dropped() {
        assert_eq!(filter(b"a\x1b]0;user@host: ~\x07b"), "ab");
        assert_eq!(filter(b"a\x1b]2;title\x1b\\b"), "ab");
    }

    #[test]
    fn test_carriage_returns_removed() {
        assert_eq!(filter(b"line1\r\nline2\r\n"), "line1\nline2\n");
    }

    #[test]
    fn test_markup_char_is_doubled() {
        assert_eq!(filter(b"# comment #1"), "## comment ##1");
    }

    #[test]
    fn test_control_bytes_dropped() {
        assert_eq!(filter(b"a\x07b\x08c\x00d\x7fe\tf"), "abcde\tf");
    }

    #[test]
    fn test_charset_designation_is_consumed() {
        assert_eq!(filter(b"\x1b(Bok"), "ok");
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut f = EscapeFilter::default();
        let mut out = String::new();
        f.filter_into(b"A\x1b[3", &mut out);
        assert!(!f.is_idle());
        f.filter_into(b"1mB\x1b", &mut out);
        f.filter_into(b"]0;title", &mut out);
        f.filter_into(b"\x07C", &mut out);
        assert_eq!(out, "A#FF3333 BC");
        assert!(f.is_idle());
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut f = EscapeFilter::default();
        let bytes = "héllo→".as_bytes();
        let mut out = String::new();
        for b in bytes {
            f.filter_into(std::slice::from_ref(b), &mut out);
        }
        assert_eq!(out, "héllo→");
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        assert_eq!(filter(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
        // Truncated two-byte sequence followed by ASCII
        assert_eq!(filter(&[0xC3, b'x']), "\u{FFFD}x");
    }

    #[test]
    fn test_overlong_params_dropped() {
        let mut input = b"\x1b[".to_vec();
        input.extend(std::iter::repeat(b'1').take(100));
        input.extend_from_slice(b"mok");
        assert_eq!(filter(&input), "ok");
    }

    #[test]
    fn test_custom_palette() {
        let palette = MarkerPalette {
            red: "AA0000".to_string(),
            ..MarkerPalette::default()
        };
        let mut f = EscapeFilter::new(&palette);
        assert_eq!(f.filter(b"\x1b[31mx"), "#AA0000 x");
    }

    #[test]
    fn test_no_escape_bytes_survive() {
        let out = filter(b"\x1b[31m\x1b]8;;http://x\x1b\\link\x1b]8;;\x1b\\\x1b[0m\x1b7\x1b8");
        assert!(!out.contains('\x1b'));
        assert_eq!(out, "#FF3333 link#/");
    }
}
