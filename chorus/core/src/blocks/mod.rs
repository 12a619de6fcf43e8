//! Incremental Block Rendering Primitives
//!
//! Streaming answers arrive as arbitrary text chunks. This module turns them
//! into a list of blocks a renderer can key on:
//!
//! ```text
//!   chunks ──► StreamAccumulator ──► BlockParser
//!                 │ raw text              │
//!                 │                       ├─ finalized blocks (never change)
//!                 ▼                       └─ pending blocks (re-parsed tail)
//!            final answer text
//! ```
//!
//! # Example
//!
//! ```
//! use chorus_core::blocks::{BlockParser, BlockType};
//!
//! let mut parser = BlockParser::new();
//! parser.append("Hello ");
//! let update = parser.append("world\n\n");
//! assert_eq!(update.blocks[0].id, "blk_0");
//! assert_eq!(update.blocks[0].kind, BlockType::Paragraph);
//! assert!(!update.blocks[0].pending);
//! ```

mod accumulator;
mod parser;

pub use accumulator::StreamAccumulator;
pub use parser::{Block, BlockParser, BlockType, IncrementalUpdate};
