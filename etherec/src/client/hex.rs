//! Byte-stream hex renderer.
//!
//! Pure transformation: a byte stream in, fixed-width rows of hex blocks
//! out. Socket reads arrive in arbitrary chunks, so the renderer carries
//! the bytes of the current unfinished row between calls; a row is emitted
//! only once it is complete, or when the caller flushes at end of stream.
//! Unfilled slots of a flushed partial row render as `..` so every row has
//! the same width.

use std::fmt::Write;

/// Bytes per block (`0x` + eight hex characters).
pub const BLOCK_BYTES: usize = 4;

/// Stateful renderer for one connection's byte stream.
pub struct HexRenderer {
    columns: usize,
    /// Bytes of the current, not-yet-flushed row. Its length is the carry
    /// position within the row.
    row: Vec<u8>,
}

impl HexRenderer {
    /// Creates a renderer with `columns` blocks of four bytes per row.
    /// A zero column count is clamped to one.
    #[must_use]
    pub fn new(columns: usize) -> Self {
        let columns = columns.max(1);
        Self {
            columns,
            row: Vec::with_capacity(columns * BLOCK_BYTES),
        }
    }

    /// Bytes already placed into the current unfinished row.
    #[must_use]
    pub fn carry(&self) -> usize {
        self.row.len()
    }

    const fn row_capacity(&self) -> usize {
        self.columns * BLOCK_BYTES
    }

    /// Consumes a chunk, emitting one line per completed row.
    ///
    /// Leftover bytes that do not fill a row are carried into the next
    /// call. A zero-byte chunk is a no-op regardless of carried state.
    pub fn push(&mut self, bytes: &[u8], emit: &mut dyn FnMut(&str)) {
        if bytes.is_empty() {
            return;
        }
        let cap = self.row_capacity();
        let mut rest = bytes;

        // Complete the carried row first.
        if !self.row.is_empty() {
            let take = (cap - self.row.len()).min(rest.len());
            self.row.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.row.len() < cap {
                return; // still incomplete, carry grows
            }
            let line = render_row(&self.row, self.columns);
            emit(&line);
            self.row.clear();
        }

        // Whole rows straight from the chunk.
        while rest.len() >= cap {
            let line = render_row(&rest[..cap], self.columns);
            emit(&line);
            rest = &rest[cap..];
        }

        self.row.extend_from_slice(rest);
    }

    /// Emits the carried partial row, if any, with `..` in the unfilled
    /// slots, and resets the carry. Called at end of stream.
    pub fn flush(&mut self, emit: &mut dyn FnMut(&str)) {
        if self.row.is_empty() {
            return;
        }
        let line = render_row(&self.row, self.columns);
        emit(&line);
        self.row.clear();
    }
}

/// Renders one row: per block, `0x` then four byte slots of two uppercase
/// hex characters (`..` where no byte was received), then a space.
fn render_row(filled: &[u8], columns: usize) -> String {
    let mut line = String::with_capacity(columns * (2 + 2 * BLOCK_BYTES + 1));
    for block in 0..columns {
        line.push_str("0x");
        for slot in 0..BLOCK_BYTES {
            match filled.get(block * BLOCK_BYTES + slot) {
                Some(b) => {
                    let _ = write!(line, "{b:02X}");
                }
                None => line.push_str(".."),
            }
        }
        line.push(' ');
    }
    line
}
