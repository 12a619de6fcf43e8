//! Incremental Block Parser
//!
//! Splits a growing markdown stream into render-ready blocks. Text is kept in
//! two regions:
//!
//! - **archived**: everything before the last stable boundary. Parsed exactly
//!   once into finalized blocks that never change again.
//! - **pending**: the tail after that boundary. Re-segmented on every append
//!   because later text can still change how it splits.
//!
//! Block IDs are `blk_<offset>` where the offset is the character position of
//! the block's first character in the cumulative stream, so a renderer can key
//! on the ID and only redraw blocks it has not seen or that are still pending.

use serde::{Deserialize, Serialize};

/// Code fence marker
const FENCE: &str = "```";

/// Kind of a block, inferred from its first non-whitespace characters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Plain text
    #[default]
    Paragraph,
    /// `#`-prefixed heading
    Heading,
    /// Fenced code region, fences included
    CodeBlock,
    /// `-`, `+` or `*` list entry
    ListItem,
    /// Anything a renderer or store does not classify further
    Other,
}

impl BlockType {
    /// Infer the block type from raw block text
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        let text = raw.trim_start();
        if text.starts_with(FENCE) {
            Self::CodeBlock
        } else if text.starts_with('#') {
            Self::Heading
        } else if text.starts_with(['-', '+', '*']) {
            Self::ListItem
        } else {
            Self::Paragraph
        }
    }
}

/// A contiguous, typed, independently renderable span of streamed text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Stable identifier, `blk_<offset>`
    pub id: String,
    /// Character offset of the first character in the cumulative text
    pub offset: usize,
    /// Raw block text, trailing newlines included
    pub content: String,
    /// Inferred block type
    #[serde(rename = "type")]
    pub kind: BlockType,
    /// Whether the block may still grow
    pub pending: bool,
}

impl Block {
    fn new(offset: usize, content: &str, kind: BlockType, pending: bool) -> Self {
        Self {
            id: format!("blk_{offset}"),
            offset,
            content: content.to_string(),
            kind,
            pending,
        }
    }
}

/// Result of one [`BlockParser::append`] call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncrementalUpdate {
    /// Complete block list: finalized blocks followed by pending ones
    pub blocks: Vec<Block>,
    /// Number of blocks finalized by this call
    pub newly_finalized: usize,
}

/// Incremental markdown block parser
///
/// Only the pending region is ever re-parsed. Finalized blocks keep their ID
/// and content for the lifetime of the parser (until [`reset`](Self::reset)).
#[derive(Clone, Debug, Default)]
pub struct BlockParser {
    /// Blocks parsed out of archived text
    finalized: Vec<Block>,
    /// Text after the last stable boundary
    pending: String,
    /// Characters moved from `pending` into finalized blocks
    archived_offset: usize,
}

impl BlockParser {
    /// Create an empty parser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all state
    pub fn reset(&mut self) {
        self.finalized.clear();
        self.pending.clear();
        self.archived_offset = 0;
    }

    /// Consume one more chunk and return the complete block list
    pub fn append(&mut self, chunk: &str) -> IncrementalUpdate {
        if chunk.is_empty() {
            return IncrementalUpdate {
                blocks: self.blocks(),
                newly_finalized: 0,
            };
        }

        self.pending.push_str(chunk);

        let newly_finalized = match find_stable_boundary(&self.pending) {
            Some(boundary) => {
                let remainder = self.pending.split_off(boundary);
                let stable = std::mem::replace(&mut self.pending, remainder);
                self.archive(&stable)
            }
            None => 0,
        };

        IncrementalUpdate {
            blocks: self.blocks(),
            newly_finalized,
        }
    }

    /// Finalize whatever is left in the pending region
    ///
    /// Called when the stream ends. An unterminated code fence becomes a
    /// single finalized code block.
    pub fn finish(&mut self) -> Vec<Block> {
        if !self.pending.is_empty() {
            let stable = std::mem::take(&mut self.pending);
            self.archive(&stable);
        }
        self.finalized.clone()
    }

    /// Current block list: finalized blocks followed by pending ones
    #[must_use]
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = self.finalized.clone();
        if !self.pending.is_empty() {
            blocks.extend(segment(&self.pending, self.archived_offset, true));
        }
        blocks
    }

    /// Blocks that will never change again
    #[must_use]
    pub fn finalized(&self) -> &[Block] {
        &self.finalized
    }

    /// Text not yet archived
    #[must_use]
    pub fn pending_text(&self) -> &str {
        &self.pending
    }

    /// Total characters archived so far
    #[must_use]
    pub fn archived_offset(&self) -> usize {
        self.archived_offset
    }

    fn archive(&mut self, stable: &str) -> usize {
        let blocks = segment(stable, self.archived_offset, false);
        let count = blocks.len();
        self.finalized.extend(blocks);
        self.archived_offset += stable.chars().count();
        tracing::trace!(
            archived_offset = self.archived_offset,
            newly_finalized = count,
            "Archived stable text"
        );
        count
    }
}

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Find the last index at which segmentation breaks regardless of what follows
///
/// Only newline-terminated lines are considered, because an unterminated last
/// line can still turn into a fence or a non-blank line. Breaks are: after a
/// blank line, before a fence-open line, after a fence-close line. Nothing
/// inside an open fence is a break, so an unterminated code region is never
/// split.
fn find_stable_boundary(buffer: &str) -> Option<usize> {
    let mut boundary = None;
    let mut in_fence = false;
    let mut cursor = 0;

    while let Some(rel) = buffer[cursor..].find('\n') {
        let line_end = cursor + rel;
        let next = line_end + 1;
        let line = &buffer[cursor..line_end];

        if is_fence_line(line) {
            if in_fence {
                boundary = Some(next);
            } else if cursor > 0 {
                boundary = Some(cursor);
            }
            in_fence = !in_fence;
        } else if !in_fence && is_blank(line) {
            boundary = Some(next);
        }

        cursor = next;
    }

    boundary
}

/// Splits a span of text into blocks
struct Segmenter<'a> {
    text: &'a str,
    base_offset: usize,
    pending: bool,
    /// Byte index where the open block starts
    block_start: usize,
    /// Same position counted in characters from the start of `text`
    block_start_chars: usize,
    blocks: Vec<Block>,
}

impl<'a> Segmenter<'a> {
    fn new(text: &'a str, base_offset: usize, pending: bool) -> Self {
        Self {
            text,
            base_offset,
            pending,
            block_start: 0,
            block_start_chars: 0,
            blocks: Vec::new(),
        }
    }

    /// Close the open block at byte index `end`; whitespace-only blocks are dropped
    fn flush(&mut self, end: usize, kind: BlockType) {
        if end <= self.block_start {
            return;
        }
        let raw = &self.text[self.block_start..end];
        if !is_blank(raw) {
            let offset = self.base_offset + self.block_start_chars;
            self.blocks.push(Block::new(offset, raw, kind, self.pending));
        }
        self.block_start = end;
        self.block_start_chars += raw.chars().count();
    }

    fn open_text(&self, end: usize) -> &'a str {
        &self.text[self.block_start..end]
    }

    fn run(mut self) -> Vec<Block> {
        let len = self.text.len();
        let mut in_fence = false;
        let mut cursor = 0;

        loop {
            let line_end = self.text[cursor..]
                .find('\n')
                .map_or(len, |rel| cursor + rel);
            let line = &self.text[cursor..line_end];
            let next = if line_end < len { line_end + 1 } else { line_end };
            let fence = is_fence_line(line);

            if in_fence {
                if fence {
                    in_fence = false;
                    self.flush(next, BlockType::CodeBlock);
                }
            } else if fence {
                if cursor > self.block_start {
                    let kind = BlockType::infer(self.open_text(cursor));
                    self.flush(cursor, kind);
                }
                in_fence = true;
            } else if is_blank(line) {
                let kind = BlockType::infer(self.open_text(next));
                self.flush(next, kind);
            }

            if line_end == len {
                break;
            }
            cursor = next;
        }

        if self.block_start < len {
            let kind = if in_fence {
                BlockType::CodeBlock
            } else {
                BlockType::infer(self.open_text(len))
            };
            self.flush(len, kind);
        }

        self.blocks
    }
}

/// Segment `text` into blocks whose offsets start at `base_offset`
fn segment(text: &str, base_offset: usize, pending: bool) -> Vec<Block> {
    if is_blank(text) {
        return Vec::new();
    }
    Segmenter::new(text, base_offset, pending).run()
}
