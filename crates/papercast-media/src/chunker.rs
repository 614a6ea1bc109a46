//! Sentence-aligned chunking for length-limited TTS services.
//!
//! Sentences end at `.`, `!` or `?` followed by whitespace. The split is
//! locale-naive: abbreviations such as "Dr." end a sentence too.

use thiserror::Error;
use tracing::warn;

use papercast_core::config::OversizePolicy;
use papercast_core::types::TextChunk;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkerError {
    #[error("chunk budget must be greater than zero")]
    ZeroBudget,
}

/// Packs sentences greedily into chunks of at most `max_chars` characters.
#[derive(Debug, Clone, Copy)]
pub struct SentenceChunker {
    max_chars: usize,
    oversize: OversizePolicy,
}

impl SentenceChunker {
    pub fn new(max_chars: usize, oversize: OversizePolicy) -> Result<Self, ChunkerError> {
        if max_chars == 0 {
            return Err(ChunkerError::ZeroBudget);
        }
        Ok(Self { max_chars, oversize })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Split `text` into ordered chunks. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let mut units: Vec<String> = Vec::new();
        for sentence in split_sentences(text) {
            let len = sentence.chars().count();
            if len <= self.max_chars {
                units.push(sentence.to_string());
                continue;
            }
            match self.oversize {
                OversizePolicy::PassThrough => {
                    warn!(
                        len,
                        max_chars = self.max_chars,
                        "Sentence exceeds chunk budget, passing through unsplit"
                    );
                    units.push(sentence.to_string());
                }
                OversizePolicy::HardSplit => units.extend(hard_split(sentence, self.max_chars)),
            }
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for unit in units {
            let len = unit.chars().count();
            if current.is_empty() {
                current = unit;
                current_len = len;
            } else if current_len + len + 1 <= self.max_chars {
                current.push(' ');
                current.push_str(&unit);
                current_len += len + 1;
            } else {
                push_chunk(&mut chunks, std::mem::take(&mut current));
                current = unit;
                current_len = len;
            }
        }
        if !current.is_empty() {
            push_chunk(&mut chunks, current);
        }
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: String) {
    chunks.push(TextChunk {
        index: chunks.len(),
        text,
    });
}

/// Chunk with the default pass-through policy for oversized sentences.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<TextChunk>, ChunkerError> {
    Ok(SentenceChunker::new(max_chars, OversizePolicy::PassThrough)?.chunk(text))
}

/// Split text into trimmed sentences, dropping empty ones.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        if chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
            let end = i + ch.len_utf8();
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let s = s.trim();
    if !s.is_empty() {
        out.push(s);
    }
}

/// Split an oversized sentence on whitespace so every piece fits the budget.
/// A single word longer than the budget is cut at character boundaries.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in sentence.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
            continue;
        }
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            pieces.push(std::mem::replace(&mut current, word.to_string()));
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
