//! Edited input line

/// Input buffer with a cursor (byte offset, always on a char boundary)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputLine {
    text: String,
    cursor: usize,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a printable character at the cursor
    pub fn insert(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        self.text.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
        true
    }

    /// Remove the character before the cursor
    pub fn backspace(&mut self) -> bool {
        let Some(prev) = self.text[..self.cursor].chars().next_back() else {
            return false;
        };
        self.cursor -= prev.len_utf8();
        self.text.remove(self.cursor);
        true
    }

    /// Replace the content and put the cursor at the end
    pub fn set(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.cursor = self.text.len();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    /// Take the content, leaving the line empty
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_backspace() {
        let mut line = InputLine::new();
        for ch in "lsé".chars() {
            assert!(line.insert(ch));
        }
        assert_eq!(line.as_str(), "lsé");
        assert_eq!(line.cursor(), 4);

        assert!(line.backspace());
        assert_eq!(line.as_str(), "ls");
        assert_eq!(line.cursor(), 2);
    }

    #[test]
    fn test_backspace_at_start_does_nothing() {
        let mut line = InputLine::new();
        assert!(!line.backspace());
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn test_control_chars_rejected() {
        let mut line = InputLine::new();
        assert!(!line.insert('\x07'));
        assert!(!line.insert('\n'));
        assert!(line.is_empty());
    }

    #[test]
    fn test_take_clears() {
        let mut line = InputLine::new();
        line.set("help");
        assert_eq!(line.take(), "help");
        assert!(line.is_empty());
        assert_eq!(line.cursor(), 0);
    }
}
