//! Reassembly of complete lines from arbitrarily split chunks

/// Holds at most one incomplete line between chunks.
///
/// Splitting happens on raw bytes so that a multi-byte UTF-8 character cut
/// by a chunk boundary is decoded only once the line is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    ///
    /// Returned lines exclude the `\n` terminator and a trailing `\r`.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if self.partial.is_empty() {
                lines.push(decode(head));
            } else {
                self.partial.extend_from_slice(head);
                lines.push(decode(&self.partial));
                self.partial.clear();
            }
            rest = &tail[1..];
        }

        self.partial.extend_from_slice(rest);
        lines
    }

    /// Bytes of the pending incomplete line
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Drop the pending fragment without emitting it
    pub fn discard(&mut self) -> usize {
        let dropped = self.partial.len();
        self.partial.clear();
        dropped
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
