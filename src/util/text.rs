//! Bounded text helpers for evidence passed between components

/// Last `max_chars` characters of `text`, never splitting a character
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// First `max_chars` characters of `text`
pub fn head_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Append-only buffer that keeps only the newest `max_chars` characters
#[derive(Debug, Clone)]
pub struct TailBuffer {
    buf: String,
    max_chars: usize,
}

impl TailBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buf: String::new(),
            max_chars,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.buf.push_str(line);
        if !line.ends_with('\n') {
            self.buf.push('\n');
        }
        // Trim lazily so long builds don't reallocate on every line
        if self.buf.len() > self.max_chars.saturating_mul(8).max(4096) {
            self.buf = tail_chars(&self.buf, self.max_chars).to_string();
        }
    }

    pub fn contents(&self) -> String {
        tail_chars(&self.buf, self.max_chars).to_string()
    }
}
