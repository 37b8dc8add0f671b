//! Incremental decoder for `text/event-stream` bodies
//!
//! Only the `data` field matters to the candidate stream; `event`, `id`,
//! `retry` and comment lines are dropped.

/// Upper bound on one unterminated event
pub const MAX_EVENT_BYTES: usize = 64 * 1024;

/// Longest separator minus one; a separator may straddle two chunks
const SEPARATOR_OVERLAP: usize = 3;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no separator
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk, returning the data of every event it completes
    ///
    /// Chunks may split lines, separators or UTF-8 sequences anywhere.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let from = self.scanned.saturating_sub(SEPARATOR_OVERLAP);
        let mut next = find_event_end(&self.buffer, from);
        while let Some((end, separator_len)) = next {
            let raw: Vec<u8> = self.buffer.drain(..end + separator_len).take(end).collect();
            if let Some(data) = parse_event(&raw) {
                events.push(data);
            }
            next = find_event_end(&self.buffer, 0);
        }
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_EVENT_BYTES {
            tracing::warn!(
                "Dropping unterminated server-sent event after {} bytes",
                self.buffer.len()
            );
            self.buffer.clear();
            self.scanned = 0;
        }

        events
    }

    /// Bytes of an event that has not been terminated yet
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_event_end(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") || rest.starts_with(b"\r\r") {
            Some((i, 2))
        } else {
            None
        }
    })
}

fn parse_event(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let mut data: Option<String> = None;

    for line in text.split(['\n', '\r']).filter(|line| !line.is_empty()) {
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    data
}
