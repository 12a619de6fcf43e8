//! Per-provider stream accumulator
//!
//! Wraps a [`BlockParser`] and keeps the raw concatenation of every chunk next
//! to it. The persisted answer is the raw text, never a re-assembly of blocks.

use super::parser::{Block, BlockParser};

/// Raw text plus incremental block list for one provider's answer
#[derive(Clone, Debug, Default)]
pub struct StreamAccumulator {
    raw: String,
    parser: BlockParser,
    blocks: Vec<Block>,
}

impl StreamAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the updated block list
    pub fn append(&mut self, chunk: &str) -> &[Block] {
        self.raw.push_str(chunk);
        self.blocks = self.parser.append(chunk).blocks;
        &self.blocks
    }

    /// Finalize the pending tail once the stream has ended
    pub fn finish(&mut self) -> &[Block] {
        self.blocks = self.parser.finish();
        &self.blocks
    }

    /// Exact concatenation of every appended chunk
    #[must_use]
    pub fn final_text(&self) -> &str {
        &self.raw
    }

    /// Text received so far, while the stream may still be running
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    /// Current block list
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Whether nothing has been appended since the last reset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Clear raw text, blocks and parser state
    pub fn reset(&mut self) {
        self.raw.clear();
        self.blocks.clear();
        self.parser.reset();
    }
}
