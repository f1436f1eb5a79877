//! Terminal renderer using crossterm
//!
//! Draws the status bar, the scrollable output area, the input bar and the
//! launcher view. All mutation happens through [`RenderSurface`]; the event
//! loop calls [`Renderer::draw`] after draining the render queue.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen, LeaveAlternateScreen},
};
use unicode_width::UnicodeWidthChar;

use super::markup::{self, Rgb, StyledChar};
use super::surface::{Focus, RenderSurface, Transcript};

const PROMPT: &str = "> ";
const TAB_WIDTH: usize = 4;

/// Launcher entries: (label, profile name)
pub const LAUNCHER_ENTRIES: [(&str, &str); 2] = [("Local SSH", "local"), ("Remote SSH (tunnel)", "remote")];

/// Terminal renderer
pub struct Renderer {
    transcript: Transcript,
    status: String,
    counter: String,
    input: String,
    focus: Focus,
    launcher_selected: usize,
    /// Lines scrolled up from the bottom
    scroll: usize,
    /// Needs a redraw
    dirty: bool,
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Renderer {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript,
            status: String::new(),
            counter: "0 B".to_string(),
            input: String::new(),
            focus: Focus::Terminal,
            launcher_selected: 0,
            scroll: 0,
            dirty: true,
            initialized: false,
        }
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        self.initialized = true;
        self.dirty = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset), Show, EnableLineWrap);
        let _ = execute!(stdout, LeaveAlternateScreen);
        let _ = stdout.flush();

        // Disable raw mode - this is the most important part
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn current_focus(&self) -> Focus {
        self.focus
    }

    /// Force a full redraw (after a resize)
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Scroll the output area; positive goes back in time
    pub fn scroll_by(&mut self, lines: isize) {
        self.scroll = if lines < 0 {
            self.scroll.saturating_sub(lines.unsigned_abs())
        } else {
            self.scroll.saturating_add(lines as usize)
        };
        self.dirty = true;
    }

    /// Move the launcher selection, wrapping around
    pub fn launcher_move(&mut self, delta: isize) {
        let n = LAUNCHER_ENTRIES.len() as isize;
        self.launcher_selected = (self.launcher_selected as isize + delta).rem_euclid(n) as usize;
        self.dirty = true;
    }

    /// Profile name of the selected launcher entry
    pub fn launcher_selection(&self) -> &'static str {
        LAUNCHER_ENTRIES[self.launcher_selected].1
    }

    /// Redraw if anything changed
    pub fn draw(&mut self) -> io::Result<()> {
        if !self.dirty || !self.initialized {
            return Ok(());
        }
        let (cols, rows) = terminal::size()?;
        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(16384, stdout.lock());

        queue!(out, Hide, Clear(ClearType::All))?;
        self.draw_status(&mut out, cols)?;
        match self.focus {
            Focus::Terminal => {
                self.draw_output(&mut out, cols, rows)?;
                self.draw_input(&mut out, cols, rows)?;
            }
            Focus::Launcher => self.draw_launcher(&mut out, rows)?,
        }
        out.flush()?;
        self.dirty = false;
        Ok(())
    }

    fn draw_status<W: Write>(&self, out: &mut W, cols: u16) -> io::Result<()> {
        let width = cols as usize;
        let counter = format!(" RX {} ", self.counter);
        let room = width.saturating_sub(counter.chars().count());
        let status = fit(&format!(" {}", self.status), room);
        let pad = room.saturating_sub(display_width(&status));
        queue!(
            out,
            MoveTo(0, 0),
            SetAttribute(Attribute::Reverse),
            Print(status),
            Print(" ".repeat(pad)),
            Print(fit(&counter, width)),
            SetAttribute(Attribute::Reset)
        )
    }

    fn draw_output<W: Write>(&mut self, out: &mut W, cols: u16, rows: u16) -> io::Result<()> {
        let height = rows.saturating_sub(2) as usize;
        if height == 0 {
            return Ok(());
        }
        let lines = layout(self.transcript.as_str(), cols as usize);
        self.scroll = self.scroll.min(lines.len().saturating_sub(height));
        let end = lines.len() - self.scroll;
        let start = end.saturating_sub(height);

        for (row, line) in lines[start..end].iter().enumerate() {
            queue!(out, MoveTo(0, row as u16 + 1))?;
            let mut current: Option<Rgb> = None;
            for cell in line {
                if cell.color != current {
                    match cell.color {
                        Some(Rgb(r, g, b)) => queue!(out, SetForegroundColor(Color::Rgb { r, g, b }))?,
                        None => queue!(out, ResetColor)?,
                    }
                    current = cell.color;
                }
                queue!(out, Print(cell.ch))?;
            }
            queue!(out, ResetColor)?;
        }
        Ok(())
    }

    fn draw_input<W: Write>(&self, out: &mut W, cols: u16, rows: u16) -> io::Result<()> {
        let width = cols as usize;
        let row = rows.saturating_sub(1);
        // Keep the tail visible when the line is wider than the screen
        let room = width.saturating_sub(PROMPT.len() + 1);
        let mut shown = self.input.as_str();
        while display_width(shown) > room {
            let mut chars = shown.chars();
            chars.next();
            shown = chars.as_str();
        }
        let cursor_col = (PROMPT.len() + display_width(shown)) as u16;
        queue!(
            out,
            MoveTo(0, row),
            SetAttribute(Attribute::Bold),
            Print(PROMPT),
            SetAttribute(Attribute::Reset),
            Print(shown),
            MoveTo(cursor_col, row),
            Show
        )
    }

    fn draw_launcher<W: Write>(&self, out: &mut W, rows: u16) -> io::Result<()> {
        let top = (rows / 3).max(2);
        queue!(out, MoveTo(2, top), SetAttribute(Attribute::Bold), Print("CONNECT"), SetAttribute(Attribute::Reset))?;
        for (i, (label, _)) in LAUNCHER_ENTRIES.iter().enumerate() {
            let row = top + 2 + i as u16;
            if i == self.launcher_selected {
                queue!(
                    out,
                    MoveTo(2, row),
                    SetAttribute(Attribute::Reverse),
                    Print(format!(" > {} ", label)),
                    SetAttribute(Attribute::Reset)
                )?;
            } else {
                queue!(out, MoveTo(2, row), Print(format!("   {} ", label)))?;
            }
        }
        queue!(
            out,
            MoveTo(2, top + 3 + LAUNCHER_ENTRIES.len() as u16),
            Print("Up/Down select, Enter connect, Esc back")
        )
    }
}

impl RenderSurface for Renderer {
    fn render_text(&mut self, fragment: &str) {
        self.transcript.push(fragment);
        self.dirty = true;
    }

    fn render_status(&mut self, text: &str) {
        if self.status != text {
            self.status = text.to_string();
            self.dirty = true;
        }
    }

    fn render_counter(&mut self, text: &str) {
        if self.counter != text {
            self.counter = text.to_string();
            self.dirty = true;
        }
    }

    fn render_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.dirty = true;
    }

    fn clear_output(&mut self) {
        self.transcript.clear();
        self.scroll = 0;
        self.dirty = true;
    }

    fn scroll_to_end(&mut self) {
        self.scroll = 0;
        self.dirty = true;
    }

    fn focus(&mut self, target: Focus) {
        self.focus = target;
        self.dirty = true;
    }
}

fn display_width(s: &str) -> usize {
    s.chars().map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate `s` to at most `width` columns
fn fit(s: &str, width: usize) -> String {
    let mut used = 0;
    let mut result = String::new();
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        result.push(ch);
    }
    result
}

/// Split marked-up text into screen lines of at most `width` columns
pub fn layout(text: &str, width: usize) -> Vec<Vec<StyledChar>> {
    let width = width.max(1);
    let mut chars = Vec::with_capacity(text.len());
    let mut color = None;
    markup::parse(text, &mut color, &mut chars);

    let mut lines = Vec::new();
    let mut line: Vec<StyledChar> = Vec::new();
    let mut used = 0;

    for cell in chars {
        match cell.ch {
            '\n' => {
                lines.push(std::mem::take(&mut line));
                used = 0;
            }
            '\t' => {
                let spaces = TAB_WIDTH - used % TAB_WIDTH;
                for _ in 0..spaces {
                    if used >= width {
                        lines.push(std::mem::take(&mut line));
                        used = 0;
                    }
                    line.push(StyledChar { ch: ' ', color: cell.color });
                    used += 1;
                }
            }
            ch => {
                let w = ch.width().unwrap_or(0);
                if used + w > width {
                    lines.push(std::mem::take(&mut line));
                    used = 0;
                }
                line.push(cell);
                used += w;
            }
        }
    }
    lines.push(line);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &[StyledChar]) -> String {
        line.iter().map(|c| c.ch).collect()
    }

    #[test]
    fn test_layout_wraps_by_display_width() {
        let lines = layout("abcdef\n日本語", 4);
        let texts: Vec<String> = lines.iter().map(|l| text(l)).collect();
        assert_eq!(texts, ["abcd", "ef", "日本", "語"]);
    }

    #[test]
    fn test_layout_keeps_colors() {
        let lines = layout("#FF3333 red#/\nplain", 80);
        assert_eq!(text(&lines[0]), "red");
        assert!(lines[0].iter().all(|c| c.color == Some(Rgb(0xFF, 0x33, 0x33))));
        assert!(lines[1].iter().all(|c| c.color.is_none()));
    }

    #[test]
    fn test_surface_updates_mark_dirty() {
        let mut r = Renderer::new(Transcript::new(64, 32));
        r.dirty = false;
        r.render_text("hello");
        assert!(r.dirty);
        assert_eq!(r.transcript().as_str(), "hello");

        r.dirty = false;
        r.render_status("");
        assert!(!r.dirty);
        r.clear_output();
        assert!(r.transcript().is_empty());
    }

    #[test]
    fn test_launcher_selection_wraps() {
        let mut r = Renderer::new(Transcript::new(64, 32));
        assert_eq!(r.launcher_selection(), "local");
        r.launcher_move(1);
        assert_eq!(r.launcher_selection(), "remote");
        r.launcher_move(1);
        assert_eq!(r.launcher_selection(), "local");
        r.launcher_move(-1);
        assert_eq!(r.launcher_selection(), "remote");
    }

    #[test]
    fn test_fit_truncates() {
        assert_eq!(fit("hello", 3), "hel");
        assert_eq!(fit("日本", 3), "日");
    }
}
