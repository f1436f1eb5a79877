//! Inline color markup
//!
//! Cleaned shell output carries `#RRGGBB ` to start a color, `#/` to reset
//! and `##` for a literal `#`. Anything else after `#` is shown as is.

use crate::core::filter::MARKUP_CHAR;

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse `RRGGBB`
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// A displayable character with its color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyledChar {
    pub ch: char,
    pub color: Option<Rgb>,
}

/// One lexical unit of marked-up text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Char(char),
    Color(Rgb),
    Reset,
}

/// Classify the token at the front of `rest` and return its byte length
fn next_token(rest: &str) -> Option<(Token, usize)> {
    let ch = rest.chars().next()?;
    if ch != MARKUP_CHAR {
        return Some((Token::Char(ch), ch.len_utf8()));
    }

    let after = &rest[1..];
    if after.starts_with(MARKUP_CHAR) {
        Some((Token::Char(ch), 2))
    } else if after.starts_with('/') {
        Some((Token::Reset, 2))
    } else if let Some(rgb) = after
        .get(..6)
        .and_then(Rgb::from_hex)
        .filter(|_| after[6..].starts_with(' '))
    {
        Some((Token::Color(rgb), 8))
    } else {
        Some((Token::Char(ch), 1))
    }
}

/// Turn marked-up text into styled characters.
///
/// `color` is the color in effect before `text` and is updated to the color
/// in effect after it.
pub fn parse(text: &str, color: &mut Option<Rgb>, out: &mut Vec<StyledChar>) {
    let mut rest = text;
    while let Some((token, len)) = next_token(rest) {
        match token {
            Token::Char(ch) => out.push(StyledChar { ch, color: *color }),
            Token::Color(rgb) => *color = Some(rgb),
            Token::Reset => *color = None,
        }
        rest = &rest[len..];
    }
}

/// First token boundary at or after byte `pos`.
///
/// `text` must itself start on a token boundary. Cutting the front of the
/// text at the returned index never splits a `##` escape or a color marker,
/// so the remaining text cannot turn escaped data into markup.
pub fn token_boundary(text: &str, pos: usize) -> usize {
    let mut i = 0;
    while i < pos {
        match next_token(&text[i..]) {
            Some((_, len)) => i += len,
            None => break,
        }
    }
    i
}
