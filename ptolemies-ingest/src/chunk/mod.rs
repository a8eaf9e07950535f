//! Sentence-boundary segmentation to size-bounded fragments (C3).

use regex::Regex;
use std::sync::LazyLock;

/// A code-fenced region is treated as a single atomic "sentence" for packing
/// purposes, matching the marker `extract` wraps code blocks in.
const CODE_FENCE: &str = "```";

static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

pub struct ChunkerConfig {
    pub max_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            min_chars: 100,
        }
    }
}

/// Splits `text` into sentence-like units, keeping fenced code regions atomic.
fn split_into_units(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut rest = text;

    while let Some(fence_start) = rest.find(CODE_FENCE) {
        let before = &rest[..fence_start];
        split_sentences_into(before, &mut units);

        let after_open = &rest[fence_start + CODE_FENCE.len()..];
        if let Some(fence_end) = after_open.find(CODE_FENCE) {
            let code_unit = &rest[fence_start..fence_start + CODE_FENCE.len() * 2 + fence_end];
            let trimmed = code_unit.trim();
            if !trimmed.is_empty() {
                units.push(trimmed.to_string());
            }
            rest = &after_open[fence_end + CODE_FENCE.len()..];
        } else {
            // unterminated fence: treat the remainder as plain text
            split_sentences_into(&rest[fence_start..], &mut units);
            rest = "";
            break;
        }
    }
    split_sentences_into(rest, &mut units);
    units
}

fn split_sentences_into(text: &str, out: &mut Vec<String>) {
    let mut last = 0;
    for m in SENTENCE_BOUNDARY.find_iter(text) {
        let sentence = text[last..m.end()].trim();
        if !sentence.is_empty() {
            out.push(sentence.to_string());
        }
        last = m.end();
    }
    let tail = text[last..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
}

/// `chunk(text) -> ordered list of fragments` (§4.3). Empty text yields zero
/// chunks. A single sentence longer than `max_chars` is emitted as its own
/// chunk rather than split mid-sentence.
pub fn chunk(text: &str, config: &ChunkerConfig) -> Vec<RawChunk> {
    let units = split_into_units(text);
    let mut flushed: Vec<String> = Vec::new();
    let mut buffer = String::new();

    for unit in units {
        if buffer.is_empty() {
            buffer = unit;
            continue;
        }
        let candidate_len = buffer.chars().count() + 1 + unit.chars().count();
        if candidate_len > config.max_chars {
            flushed.push(std::mem::take(&mut buffer));
            buffer = unit;
        } else {
            buffer.push(' ');
            buffer.push_str(&unit);
        }
    }
    if !buffer.is_empty() {
        flushed.push(buffer);
    }

    let surviving: Vec<String> = flushed
        .into_iter()
        .filter(|c| c.chars().count() >= config.min_chars)
        .collect();

    let total_chunks = surviving.len();
    surviving
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| RawChunk {
            content,
            chunk_index,
            total_chunks,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ChunkerConfig {
        ChunkerConfig::default()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk("", &cfg()).is_empty());
    }

    #[test]
    fn short_text_below_min_chars_is_dropped() {
        assert!(chunk("Too short.", &cfg()).is_empty());
    }

    #[test]
    fn long_text_splits_at_sentence_boundaries() {
        let text = "A. B. C. ".repeat(222); // ~2000 chars
        let chunks = chunk(&text, &cfg());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[0].total_chunks, 2);
        assert!(chunks[0].content.chars().count() <= 1200);
    }

    #[test]
    fn oversize_sentence_is_its_own_chunk() {
        let sentence = format!("{}.", "x".repeat(2000));
        let chunks = chunk(&sentence, &cfg());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.chars().count() > 1200);
    }

    #[test]
    fn code_fence_never_split() {
        let code = "```\nfn main() {\nprintln!(\"hi\");\n}\n```";
        let text = format!("Intro sentence here. {} More text follows after.", code);
        let chunks = chunk(&text, &cfg());
        assert!(chunks.iter().any(|c| c.content.contains("fn main")));
        for c in &chunks {
            if c.content.contains(CODE_FENCE) {
                assert!(c.content.contains("```\nfn main"));
            }
        }
    }
}
