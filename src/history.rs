//! Command history for pagerterm
//!
//! Ordered, deduplicated log of submitted lines with up/down browsing into
//! the input line and deletion of the browsed entry.

use crate::console::input::InputLine;
use crate::store::{ProfileStore, StoreError};

/// Maximum number of history entries
const HISTORY_LIMIT: usize = 200;

/// Command history storage
#[derive(Debug, Default)]
pub struct CommandHistory {
    /// All entries (newest last)
    entries: Vec<String>,
    /// Distance from the newest entry while browsing
    cursor: Option<usize>,
    /// Maximum entries
    max_entries: usize,
    /// Changed since the last save
    dirty: bool,
}

impl CommandHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::with_entries(Vec::new())
    }

    /// Create a history holding `entries` (oldest first)
    pub fn with_entries(entries: Vec<String>) -> Self {
        let mut history = Self {
            entries: Vec::with_capacity(entries.len()),
            cursor: None,
            max_entries: HISTORY_LIMIT,
            dirty: false,
        };
        for entry in entries {
            history.push_unique(entry);
        }
        history.dirty = false;
        history
    }

    /// Load history from the store; a failed read yields an empty history
    pub fn load(store: &dyn ProfileStore) -> Self {
        match store.load_history() {
            Ok(entries) => Self::with_entries(entries),
            Err(e) => {
                tracing::warn!("Failed to load history: {}", e);
                Self::new()
            }
        }
    }

    /// Save history to the store if it changed
    pub fn save(&mut self, store: &dyn ProfileStore) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        store.save_history(&self.entries)?;
        self.dirty = false;
        Ok(())
    }

    /// Add a submitted line as the most recent entry.
    ///
    /// An earlier copy of the same line is removed first. Browsing resets.
    pub fn record(&mut self, line: &str) {
        self.cursor = None;
        if line.trim().is_empty() {
            return;
        }
        self.push_unique(line.to_string());
        self.dirty = true;
    }

    fn push_unique(&mut self, line: String) {
        self.entries.retain(|e| *e != line);
        self.entries.push(line);

        // Trim if exceeding limit
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
    }

    /// Browse history into `input`.
    ///
    /// `direction > 0` moves toward older entries and stops at the oldest.
    /// `direction < 0` moves toward newer entries; stepping past the newest
    /// clears the input and ends browsing.
    pub fn navigate(&mut self, direction: i32, input: &mut InputLine) {
        if self.entries.is_empty() || direction == 0 {
            return;
        }

        if direction > 0 {
            let oldest = self.entries.len() - 1;
            self.cursor = Some(self.cursor.map_or(0, |c| (c + 1).min(oldest)));
        } else {
            match self.cursor {
                Some(c) if c > 0 => self.cursor = Some(c - 1),
                _ => {
                    self.cursor = None;
                    input.clear();
                    return;
                }
            }
        }

        self.show_current(input);
    }

    /// Remove the entry under the cursor.
    ///
    /// The cursor stays on the same distance from the newest entry, clamped
    /// to the remaining entries, and `input` shows the new selection. Does
    /// nothing when not browsing.
    pub fn delete_current(&mut self, input: &mut InputLine) -> bool {
        let Some(cursor) = self.cursor else {
            return false;
        };
        if cursor >= self.entries.len() {
            self.cursor = None;
            return false;
        }

        let index = self.entries.len() - 1 - cursor;
        self.entries.remove(index);
        self.dirty = true;

        if self.entries.is_empty() {
            self.cursor = None;
            input.clear();
        } else {
            self.cursor = Some(cursor.min(self.entries.len() - 1));
            self.show_current(input);
        }
        true
    }

    fn show_current(&self, input: &mut InputLine) {
        if let Some(entry) = self.current() {
            input.set(entry);
        }
    }

    /// Entry under the cursor
    pub fn current(&self) -> Option<&str> {
        let cursor = self.cursor?;
        let index = self.entries.len().checked_sub(cursor + 1)?;
        self.entries.get(index).map(String::as_str)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Stop browsing without touching the input
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    /// Entries, oldest first
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TomlStore;

    fn history(entries: &[&str]) -> CommandHistory {
        CommandHistory::with_entries(entries.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_record_moves_duplicate_to_newest() {
        let mut h = history(&["ls", "pwd", "whoami"]);
        h.record("pwd");
        assert_eq!(h.entries(), ["ls", "whoami", "pwd"]);
        assert_eq!(h.entries().iter().filter(|e| *e == "pwd").count(), 1);
        assert!(h.is_dirty());
    }

    #[test]
    fn test_record_ignores_blank_lines() {
        let mut h = CommandHistory::new();
        h.record("   ");
        assert!(h.is_empty());
        assert!(!h.is_dirty());
    }

    #[test]
    fn test_navigate_up_stops_at_oldest() {
        let mut h = history(&["a", "b", "c"]);
        let mut input = InputLine::new();
        for _ in 0..10 {
            h.navigate(1, &mut input);
        }
        assert_eq!(input.as_str(), "a");
        assert_eq!(h.cursor(), Some(2));
        assert_eq!(input.cursor(), 1);
    }

    #[test]
    fn test_navigate_down_from_newest_clears_input() {
        let mut h = history(&["a", "b"]);
        let mut input = InputLine::new();
        h.navigate(1, &mut input);
        assert_eq!(input.as_str(), "b");
        h.navigate(1, &mut input);
        assert_eq!(input.as_str(), "a");
        h.navigate(-1, &mut input);
        assert_eq!(input.as_str(), "b");
        h.navigate(-1, &mut input);
        assert_eq!(input.as_str(), "");
        assert_eq!(h.cursor(), None);
    }

    #[test]
    fn test_navigate_on_empty_history_is_noop() {
        let mut h = CommandHistory::new();
        let mut input = InputLine::new();
        input.insert('x');
        h.navigate(1, &mut input);
        h.navigate(-1, &mut input);
        assert_eq!(input.as_str(), "x");
    }

    #[test]
    fn test_delete_current_on_empty_history_is_noop() {
        let mut h = CommandHistory::new();
        let mut input = InputLine::new();
        input.set("draft");
        assert!(!h.delete_current(&mut input));
        assert_eq!(input.as_str(), "draft");
        assert_eq!(input.cursor(), 5);
        assert_eq!(h.cursor(), None);
    }

    #[test]
    fn test_delete_current_selects_next_older() {
        let mut h = history(&["a", "b", "c"]);
        let mut input = InputLine::new();
        h.navigate(1, &mut input);
        h.navigate(1, &mut input);
        assert_eq!(input.as_str(), "b");

        assert!(h.delete_current(&mut input));
        assert_eq!(h.entries(), ["a", "c"]);
        assert_eq!(input.as_str(), "a");
        assert_eq!(h.cursor(), Some(1));
    }

    #[test]
    fn test_delete_oldest_clamps_cursor() {
        let mut h = history(&["a", "b"]);
        let mut input = InputLine::new();
        h.navigate(1, &mut input);
        h.navigate(1, &mut input);
        h.delete_current(&mut input);
        assert_eq!(h.cursor(), Some(0));
        assert_eq!(input.as_str(), "b");

        h.delete_current(&mut input);
        assert!(h.is_empty());
        assert_eq!(h.cursor(), None);
        assert_eq!(input.as_str(), "");
    }

    #[test]
    fn test_record_resets_cursor() {
        let mut h = history(&["a"]);
        let mut input = InputLine::new();
        h.navigate(1, &mut input);
        h.record("b");
        assert_eq!(h.cursor(), None);
    }

    #[test]
    fn test_history_limit() {
        let mut h = CommandHistory::new();
        for i in 0..HISTORY_LIMIT + 5 {
            h.record(&format!("cmd {}", i));
        }
        assert_eq!(h.len(), HISTORY_LIMIT);
        assert_eq!(h.entries()[0], "cmd 5");
    }

    #[test]
    fn test_save_only_when_dirty() {
        let store = TomlStore::in_memory();
        let mut h = CommandHistory::load(&store);
        assert!(h.is_empty());
        h.save(&store).unwrap();
        assert!(store.load_history().unwrap().is_empty());

        h.record("uptime");
        h.save(&store).unwrap();
        assert!(!h.is_dirty());

        let reloaded = CommandHistory::load(&store);
        assert_eq!(reloaded.entries(), ["uptime"]);
    }
}
