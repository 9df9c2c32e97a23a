use tracing::warn;

/// Splits raw body chunks into text lines.
///
/// Chunk edges are arbitrary, so a partial trailing line is held back until
/// its terminator arrives. `\n` and `\r\n` both end a line; invalid UTF-8 is
/// replaced rather than rejected. A line longer than `max_bytes` is dropped
/// whole: the held bytes are discarded and so is the rest of that line.
#[derive(Debug)]
pub struct LineSplitter {
    pending: Vec<u8>,
    max_bytes: usize,
    discarding: bool,
    overflows: u64,
}

impl LineSplitter {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_bytes,
            discarding: false,
            overflows: 0,
        }
    }

    /// Feed a chunk and collect every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                if self.pending.last() == Some(&b'\r') {
                    self.pending.pop();
                }
                lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                self.pending.clear();
            } else if !self.discarding {
                self.pending.push(byte);
                if self.pending.len() > self.max_bytes {
                    warn!(
                        "Feed line exceeds {} bytes without a terminator, discarding it",
                        self.max_bytes
                    );
                    self.pending.clear();
                    self.discarding = true;
                    self.overflows += 1;
                }
            }
        }

        lines
    }

    /// Bytes received after the last complete line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of over-long lines dropped so far
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}

/// Text accumulated from one feed since the last boundary marker
#[derive(Debug)]
pub struct StreamBuffer {
    boundary: String,
    text: String,
    max_bytes: usize,
    overflows: u64,
}

impl StreamBuffer {
    pub fn new<S: Into<String>>(boundary: S, max_bytes: usize) -> Self {
        Self {
            boundary: boundary.into(),
            text: String::new(),
            max_bytes,
            overflows: 0,
        }
    }

    /// Append a line. When the line carries the boundary marker the whole
    /// accumulated text is handed back and the buffer starts over empty.
    /// Empty lines are skipped. If the text outgrows `max_bytes` before a
    /// boundary arrives it is thrown away.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return None;
        }

        self.text.push_str(line);
        self.text.push('\n');

        if line.contains(self.boundary.as_str()) {
            return Some(std::mem::take(&mut self.text));
        }

        if self.text.len() > self.max_bytes {
            warn!(
                "No boundary within {} bytes of feed text, resetting buffer",
                self.max_bytes
            );
            self.text.clear();
            self.overflows += 1;
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of times the buffer was reset for growing past `max_bytes`
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}
