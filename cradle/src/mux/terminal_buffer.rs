//! Terminal scrollback buffer.
//!
//! A byte-bounded ring of complete lines plus the trailing partial line.
//! The stdout pump appends; attach handlers take a snapshot to reconstruct
//! the current screen for a late attacher.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Default retention. Comfortably more than one screen of output.
const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Mutex-guarded scrollback ring.
pub struct TerminalBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    lines: VecDeque<Vec<u8>>,
    partial: Vec<u8>,
    used: usize,
}

impl TerminalBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                lines: VecDeque::new(),
                partial: Vec::new(),
                used: 0,
            }),
        }
    }

    /// Append pump output, evicting the oldest lines once over capacity.
    pub fn push(&self, buf: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.partial.extend_from_slice(buf);

        while let Some(pos) = inner.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = inner.partial.drain(..=pos).collect();
            inner.used += line.len();
            inner.lines.push_back(line);
        }

        while inner.used + inner.partial.len() > self.capacity {
            match inner.lines.pop_front() {
                Some(line) => inner.used -= line.len(),
                None => break,
            }
        }
        if inner.partial.len() > self.capacity {
            let excess = inner.partial.len() - self.capacity;
            inner.partial.drain(..excess);
        }
    }

    /// The bytes a fresh attacher needs to reconstruct the screen.
    pub fn snapshot(&self) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::with_capacity(inner.used + inner.partial.len());
        for line in &inner.lines {
            out.extend_from_slice(line);
        }
        out.extend_from_slice(&inner.partial);
        out
    }
}

impl Default for TerminalBuffer {
    fn default() -> Self {
        Self::new()
    }
}
