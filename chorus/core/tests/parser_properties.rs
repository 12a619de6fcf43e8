//! Chunking-independence properties of the incremental block parser
//!
//! The same answer text must produce the same finalized blocks no matter how
//! the provider happened to slice it into chunks.

use chorus_core::{Block, BlockParser, BlockType};
use pretty_assertions::assert_eq;

const SAMPLES: &[&str] = &[
    "Hello world\n\n## Title\nbody",
    "Intro paragraph.\n\n```rust\nfn main() {\n\n    println!(\"hi\");\n}\n```\nAfter the fence.\n\n- one\n- two\n",
    "```py\ncode\n```\n",
    "   \n\n\nleading blanks\n\n\n\ntrailing blanks\n\n   ",
    "Unicode: héllo wörld ✓\n\n# Überschrift\n\n* ünïcödé list\n",
    "Text before\n```\nunterminated fence\n\nstill code",
    "inline ``` marker does not open a fence\n\nnext",
    "  ```indented fence\nx\n  ```\ntail",
    "a\r\n\r\nb\r\n",
];

fn parse_in_chunks(text: &str, sizes: &[usize]) -> Vec<Block> {
    let chars: Vec<char> = text.chars().collect();
    let mut parser = BlockParser::new();
    let mut pos = 0;
    let mut i = 0;
    while pos < chars.len() {
        let size = sizes[i % sizes.len()].max(1);
        let end = (pos + size).min(chars.len());
        let chunk: String = chars[pos..end].iter().collect();
        parser.append(&chunk);
        pos = end;
        i += 1;
    }
    parser.finish()
}

fn parse_whole(text: &str) -> Vec<Block> {
    let mut parser = BlockParser::new();
    parser.append(text);
    parser.finish()
}

fn fence_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count()
}

#[test]
fn test_full_parse_is_independent_of_chunking() {
    let chunkings: &[&[usize]] = &[&[1], &[2], &[3], &[5], &[7, 1, 4], &[13], &[1, 30]];

    for text in SAMPLES {
        let expected = parse_whole(text);
        for sizes in chunkings {
            let actual = parse_in_chunks(text, sizes);
            assert_eq!(actual, expected, "chunk sizes {sizes:?} for {text:?}");
        }
    }
}

#[test]
fn test_block_ids_match_character_offsets() {
    for text in SAMPLES {
        let chars: Vec<char> = text.chars().collect();
        for block in parse_in_chunks(text, &[3]) {
            assert_eq!(block.id, format!("blk_{}", block.offset));
            let len = block.content.chars().count();
            let at: String = chars[block.offset..block.offset + len].iter().collect();
            assert_eq!(at, block.content, "block {} of {text:?}", block.id);
        }
    }
}

#[test]
fn test_finalized_blocks_never_change() {
    for text in SAMPLES {
        let mut parser = BlockParser::new();
        let mut seen: Vec<Block> = Vec::new();

        for ch in text.chars() {
            let update = parser.append(&ch.to_string());
            let finalized: Vec<Block> = update.blocks.iter().filter(|b| !b.pending).cloned().collect();

            assert!(finalized.len() >= seen.len());
            assert_eq!(&finalized[..seen.len()], &seen[..], "finalized prefix changed in {text:?}");
            assert_eq!(finalized.len() - seen.len(), update.newly_finalized);

            // pending blocks only ever trail
            let first_pending = update.blocks.iter().position(|b| b.pending);
            if let Some(index) = first_pending {
                assert!(update.blocks[index..].iter().all(|b| b.pending));
            }
            seen = finalized;
        }
    }
}

#[test]
fn test_fences_are_never_split_while_streaming() {
    for text in SAMPLES {
        let mut parser = BlockParser::new();
        for ch in text.chars() {
            parser.append(&ch.to_string());
            for block in parser.finalized() {
                assert_eq!(
                    fence_lines(&block.content) % 2,
                    0,
                    "finalized block {:?} splits a fence",
                    block.content
                );
            }
        }

        let blocks = parser.finish();
        let odd: Vec<&Block> = blocks
            .iter()
            .filter(|b| fence_lines(&b.content) % 2 == 1)
            .collect();
        assert!(odd.len() <= 1);
        if let Some(block) = odd.first() {
            assert_eq!(block.id, blocks.last().map(|b| b.id.clone()).unwrap_or_default());
            assert_eq!(block.kind, BlockType::CodeBlock);
        }
    }
}

#[test]
fn test_unterminated_fence_is_kept_whole() {
    let blocks = parse_in_chunks("Text before\n```\nunterminated fence\n\nstill code", &[4]);

    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].content, "Text before\n");
    assert_eq!(blocks[1].content, "```\nunterminated fence\n\nstill code");
    assert_eq!(blocks[1].kind, BlockType::CodeBlock);
}

#[test]
fn test_stream_example_from_chunks() {
    let mut parser = BlockParser::new();
    let chunks = ["```py\n", "code", "\n```\n"];

    assert_eq!(parser.append(chunks[0]).newly_finalized, 0);
    assert_eq!(parser.append(chunks[1]).newly_finalized, 0);
    let update = parser.append(chunks[2]);

    assert_eq!(update.newly_finalized, 1);
    assert_eq!(update.blocks.len(), 1);
    assert_eq!(update.blocks[0].content, chunks.concat());
    assert_eq!(update.blocks[0].kind, BlockType::CodeBlock);
}
