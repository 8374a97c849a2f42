//! The working input line as a head/tail split buffer, plus its scrollback
//! ring.
//!
//! Layout: `buf[0..head]` holds the characters before the cursor, `buf[tail..
//! CAPACITY]` holds the characters after it, and `buf[head..tail]` is an
//! unused gap. Moving the cursor by one position shuffles a single character
//! across the gap instead of shifting everything after it, so repeated
//! single-step motion (the common case while typing) stays O(1).
//!
//! This is the model `InputArea` edits through; `input_line` owns the
//! line-wrapping and rendering on top of it.

use std::cmp::min;

/// Fixed capacity of the working buffer, in chars.
pub(crate) const CAPACITY: usize = 1024;

/// Scrollback ring size. Must be a power of two (masked indexing).
pub(crate) const HISTORY_SIZE: usize = 64;

pub(crate) struct GapBuffer {
    buf: Vec<char>,
    head: usize,
    tail: usize,

    history: Vec<Option<String>>,
    /// Ring slot of the oldest entry.
    history_head: usize,
    history_len: usize,
    /// `Some(n)` while browsing the n-th entry from the oldest; `None` while
    /// editing the live buffer.
    scrollback: Option<usize>,

    /// Leftmost logical character index currently in the rendering frame.
    frame_start: usize,
}

impl GapBuffer {
    pub(crate) fn new() -> GapBuffer {
        GapBuffer {
            buf: vec!['\0'; CAPACITY],
            head: 0,
            tail: CAPACITY,
            history: vec![None; HISTORY_SIZE],
            history_head: 0,
            history_len: 0,
            scrollback: None,
            frame_start: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.head + (CAPACITY - self.tail)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor position, as a character index into the logical contents.
    pub(crate) fn cursor(&self) -> usize {
        self.head
    }

    fn char_at(&self, idx: usize) -> char {
        if idx < self.head {
            self.buf[idx]
        } else {
            self.buf[self.tail + (idx - self.head)]
        }
    }

    pub(crate) fn contents(&self) -> String {
        (0..self.len()).map(|i| self.char_at(i)).collect()
    }

    /// Appends at the cursor. Fails (leaving the buffer unchanged) if there's
    /// not enough room for all of `text`.
    pub(crate) fn insert(&mut self, text: &str) -> bool {
        let n = text.chars().count();
        if self.tail - self.head < n {
            return false;
        }
        for c in text.chars() {
            self.buf[self.head] = c;
            self.head += 1;
        }
        self.scrollback = None;
        true
    }

    pub(crate) fn cursor_back(&mut self) -> bool {
        if self.head == 0 {
            return false;
        }
        self.head -= 1;
        self.tail -= 1;
        self.buf[self.tail] = self.buf[self.head];
        true
    }

    pub(crate) fn cursor_forw(&mut self) -> bool {
        if self.tail == CAPACITY {
            return false;
        }
        self.buf[self.head] = self.buf[self.tail];
        self.head += 1;
        self.tail += 1;
        true
    }

    pub(crate) fn delete_back(&mut self) -> bool {
        if self.head == 0 {
            return false;
        }
        self.head -= 1;
        true
    }

    pub(crate) fn delete_forw(&mut self) -> bool {
        if self.tail == CAPACITY {
            return false;
        }
        self.tail += 1;
        true
    }

    /// Clears the working buffer. Returns whether it was non-empty.
    pub(crate) fn reset(&mut self) -> bool {
        let was_nonempty = !self.is_empty();
        self.head = 0;
        self.tail = CAPACITY;
        self.scrollback = None;
        self.frame_start = 0;
        was_nonempty
    }

    /// If the working buffer is non-empty, pushes it to the history ring
    /// (overwriting the oldest entry at capacity), resets the working buffer,
    /// and resets the scrollback index. Returns whether anything was pushed.
    pub(crate) fn history_push(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }
        let contents = self.contents();
        let slot = (self.history_head + self.history_len) & (HISTORY_SIZE - 1);
        if self.history_len == HISTORY_SIZE {
            self.history_head = (self.history_head + 1) & (HISTORY_SIZE - 1);
        } else {
            self.history_len += 1;
        }
        self.history[slot] = Some(contents);
        self.reset();
        true
    }

    fn history_slot(&self, offset_from_oldest: usize) -> usize {
        (self.history_head + offset_from_oldest) & (HISTORY_SIZE - 1)
    }

    fn load_history(&mut self, offset_from_oldest: usize) {
        let slot = self.history_slot(offset_from_oldest);
        let entry = self.history[slot].clone().unwrap_or_default();
        self.head = 0;
        self.tail = CAPACITY;
        for c in entry.chars() {
            self.buf[self.head] = c;
            self.head += 1;
        }
        self.frame_start = 0;
        self.scrollback = Some(offset_from_oldest);
    }

    /// Moves to the previous (older) scrollback entry, copying it into the
    /// working buffer. Returns false without changing state at the oldest
    /// entry, or when there's no history.
    pub(crate) fn history_back(&mut self) -> bool {
        if self.history_len == 0 {
            return false;
        }
        let new_offset = match self.scrollback {
            None => self.history_len - 1,
            Some(0) => return false,
            Some(off) => off - 1,
        };
        self.load_history(new_offset);
        true
    }

    /// Moves to the next (newer) scrollback entry. Returns false without
    /// changing state when not browsing history, or already at the newest
    /// entry.
    pub(crate) fn history_forw(&mut self) -> bool {
        match self.scrollback {
            None => false,
            Some(off) if off + 1 >= self.history_len => false,
            Some(off) => {
                self.load_history(off + 1);
                true
            }
        }
    }

    /// Returns a window of the buffer `window_width` characters wide and the
    /// cursor's column within it, sliding the frame in half-window steps as
    /// the cursor leaves the viewport.
    pub(crate) fn frame(&mut self, window_width: usize) -> (String, usize) {
        if window_width == 0 {
            return (String::new(), 0);
        }
        let step = (window_width / 2).max(1);
        while self.head < self.frame_start {
            self.frame_start = self.frame_start.saturating_sub(step);
        }
        while self.head >= self.frame_start + window_width {
            self.frame_start += step;
        }
        let len = self.len();
        let end = (self.frame_start + window_width).min(len);
        let slice = (self.frame_start..end).map(|i| self.char_at(i)).collect();
        (slice, self.head - self.frame_start)
    }

    /// Locates the whitespace-delimited word around the cursor, calls
    /// `callback(word, first_in_line)`, and splices the result in place,
    /// re-anchoring the cursor at the end of the replacement. Truncates the
    /// replacement to fit capacity if needed. Returns false, leaving the
    /// buffer unchanged, if `callback` finds no match.
    pub(crate) fn complete<F>(&mut self, callback: F) -> bool
    where
        F: FnOnce(&str, bool) -> Option<String>,
    {
        let len = self.len();
        let cursor = self.head;

        let mut start = cursor;
        while start > 0 && self.char_at(start - 1) != ' ' {
            start -= 1;
        }
        let mut end = cursor;
        while end < len && self.char_at(end) != ' ' {
            end += 1;
        }

        let word: String = (start..end).map(|i| self.char_at(i)).collect();
        let first_in_line = start == 0;

        let replacement = match callback(&word, first_in_line) {
            None => return false,
            Some(r) => r,
        };

        let mut spliced: Vec<char> = Vec::with_capacity(len - (end - start) + replacement.len());
        spliced.extend((0..start).map(|i| self.char_at(i)));
        let replacement_chars: Vec<char> = replacement.chars().collect();
        spliced.extend(replacement_chars.iter().copied());
        spliced.extend((end..len).map(|i| self.char_at(i)));
        spliced.truncate(CAPACITY);

        let new_cursor = min(start + replacement_chars.len(), spliced.len());
        let total_len = spliced.len();

        for (i, c) in spliced.into_iter().enumerate() {
            if i < new_cursor {
                self.buf[i] = c;
            } else {
                self.buf[CAPACITY - (total_len - i)] = c;
            }
        }
        self.head = new_cursor;
        self.tail = CAPACITY - (total_len - new_cursor);
        self.scrollback = None;

        true
    }
}

impl Default for GapBuffer {
    fn default() -> GapBuffer {
        GapBuffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_motion() {
        let mut gb = GapBuffer::new();
        assert!(gb.insert("hello"));
        assert_eq!(gb.contents(), "hello");
        assert_eq!(gb.cursor(), 5);

        assert!(gb.cursor_back());
        assert!(gb.cursor_back());
        assert_eq!(gb.cursor(), 3);
        assert_eq!(gb.contents(), "hello");

        assert!(gb.insert("XY"));
        assert_eq!(gb.contents(), "helXYlo");
        assert_eq!(gb.cursor(), 5);

        assert!(gb.cursor_forw());
        assert_eq!(gb.cursor(), 6);
    }

    #[test]
    fn motion_fails_at_ends() {
        let mut gb = GapBuffer::new();
        assert!(!gb.cursor_back());
        assert!(!gb.cursor_forw());
        assert!(!gb.delete_back());
        assert!(!gb.delete_forw());

        gb.insert("ab");
        assert!(!gb.cursor_forw()); // already at end
        assert!(gb.cursor_back());
        assert!(gb.cursor_back());
        assert!(!gb.cursor_back()); // already at start
    }

    #[test]
    fn delete_back_and_forw() {
        let mut gb = GapBuffer::new();
        gb.insert("abc");
        assert!(gb.delete_back());
        assert_eq!(gb.contents(), "ab");
        gb.cursor_back();
        assert!(gb.delete_forw());
        assert_eq!(gb.contents(), "a");
    }

    #[test]
    fn reset_reports_whether_nonempty() {
        let mut gb = GapBuffer::new();
        assert!(!gb.reset());
        gb.insert("x");
        assert!(gb.reset());
        assert_eq!(gb.contents(), "");
    }

    #[test]
    fn insert_fails_without_room() {
        let mut gb = GapBuffer::new();
        let long = "a".repeat(CAPACITY);
        assert!(gb.insert(&long));
        assert!(!gb.insert("b"));
        assert_eq!(gb.len(), CAPACITY);
    }

    #[test]
    fn history_push_and_navigate() {
        let mut gb = GapBuffer::new();
        assert!(!gb.history_push()); // nothing to push

        gb.insert("first");
        assert!(gb.history_push());
        assert_eq!(gb.contents(), "");

        gb.insert("second");
        gb.history_push();

        assert!(gb.history_back());
        assert_eq!(gb.contents(), "second");
        assert!(gb.history_back());
        assert_eq!(gb.contents(), "first");
        assert!(!gb.history_back()); // at oldest

        assert!(gb.history_forw());
        assert_eq!(gb.contents(), "second");
        assert!(!gb.history_forw()); // at newest
    }

    #[test]
    fn history_ring_wraps_at_capacity() {
        let mut gb = GapBuffer::new();
        for i in 0..HISTORY_SIZE + 10 {
            gb.insert(&i.to_string());
            gb.history_push();
        }
        gb.history_back();
        assert_eq!(gb.contents(), (HISTORY_SIZE + 9).to_string());
    }

    #[test]
    fn frame_slides_as_cursor_leaves_viewport() {
        let mut gb = GapBuffer::new();
        gb.insert("0123456789");
        for _ in 0..10 {
            gb.cursor_back();
        }
        let (slice, col) = gb.frame(4);
        assert_eq!(col, 0);
        assert_eq!(&slice, "0123");

        for _ in 0..10 {
            gb.cursor_forw();
        }
        let (slice, col) = gb.frame(4);
        assert!(col < 4);
        assert_eq!(slice.len(), 4.min(gb.len() - (gb.cursor() - col)));
    }

    #[test]
    fn complete_splices_replacement_and_reanchors_cursor() {
        let mut gb = GapBuffer::new();
        gb.insert("hi al");
        assert!(gb.complete(|word, first_in_line| {
            assert_eq!(word, "al");
            assert!(!first_in_line);
            Some("alice".to_string())
        }));
        assert_eq!(gb.contents(), "hi alice");
        assert_eq!(gb.cursor(), "hi alice".len());
    }

    #[test]
    fn complete_expands_trailing_word() {
        let mut gb = GapBuffer::new();
        gb.insert(" abc ab");
        assert!(gb.complete(|word, first_in_line| {
            assert_eq!(word, "ab");
            assert!(!first_in_line);
            Some("xyxyxy".to_string())
        }));
        assert_eq!(gb.contents(), " abc xyxyxy");
        assert_eq!(gb.cursor(), " abc xyxyxy".len());
    }

    #[test]
    fn complete_no_match_leaves_buffer_unchanged() {
        let mut gb = GapBuffer::new();
        gb.insert("hi al");
        assert!(!gb.complete(|_, _| None));
        assert_eq!(gb.contents(), "hi al");
    }
}
