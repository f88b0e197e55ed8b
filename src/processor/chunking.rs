//! # Text Chunking Module
//!
//! Splits page or document text into overlapping word windows for embedding.
//!
//! ## Chunking Strategy
//!
//! 1. Text is tokenized into words, remembering whether each word starts a
//!    line or a paragraph so chunk text keeps its layout
//! 2. A window ends at the last paragraph break in its second half when one
//!    exists, otherwise at the target size
//! 3. The next window starts `overlap_size` words before the previous end
//! 4. Lines ending in `:` after a blank line are headings; every chunk
//!    carries the heading in effect where it starts

use crate::processor::ChunkOptions;
use crate::processor::error::ProcessError;
use serde::Serialize;
use tracing::{debug, instrument};

/// A chunk of text with metadata
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextChunk {
    /// The text of the chunk
    pub text: String,

    /// The position of the chunk in the original document
    pub position: usize,

    /// The heading of the chunk
    pub heading: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Break {
    None,
    Line,
    Paragraph,
}

struct Word<'a> {
    text: &'a str,
    before: Break,
}

struct Tokens<'a> {
    words: Vec<Word<'a>>,
    /// Word index where each heading starts, with the heading text
    headings: Vec<(usize, String)>,
}

fn tokenize(text: &str) -> Tokens<'_> {
    let mut words: Vec<Word<'_>> = Vec::new();
    let mut headings = Vec::new();
    let mut blank_line_seen = true;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_line_seen = true;
            continue;
        }

        let before_first = if words.is_empty() {
            Break::None
        } else if blank_line_seen {
            Break::Paragraph
        } else {
            Break::Line
        };

        if blank_line_seen && trimmed.len() > 1 && trimmed.ends_with(':') {
            let heading = trimmed.trim_end_matches(':').trim().to_string();
            headings.push((words.len(), heading));
        }

        for (i, word) in trimmed.split_whitespace().enumerate() {
            words.push(Word {
                text: word,
                before: if i == 0 { before_first } else { Break::None },
            });
        }
        blank_line_seen = false;
    }

    Tokens { words, headings }
}

fn render(words: &[Word<'_>]) -> String {
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.push_str(match word.before {
                Break::Paragraph => "\n\n",
                Break::Line => "\n",
                Break::None => " ",
            });
        }
        out.push_str(word.text);
    }
    out
}

fn heading_at(headings: &[(usize, String)], start: usize) -> Option<String> {
    headings
        .iter()
        .rev()
        .find(|(index, _)| *index <= start)
        .map(|(_, heading)| heading.clone())
}

/// Chunk text into overlapping word windows
#[instrument(skip(text))]
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Result<Vec<TextChunk>, ProcessError> {
    if options.target_chunk_size == 0 {
        return Err(ProcessError::Chunking(
            "target_chunk_size must be greater than zero".to_string(),
        ));
    }
    if options.overlap_size >= options.target_chunk_size {
        return Err(ProcessError::Chunking(format!(
            "overlap_size ({}) must be smaller than target_chunk_size ({})",
            options.overlap_size, options.target_chunk_size
        )));
    }

    let Tokens { words, headings } = tokenize(text);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = (start + options.target_chunk_size).min(words.len());
        if end < words.len() {
            let earliest = start + options.target_chunk_size / 2;
            if let Some(paragraph) = (earliest + 1..end)
                .rev()
                .find(|&i| words[i].before == Break::Paragraph)
            {
                end = paragraph;
            }
        }

        chunks.push(TextChunk {
            text: render(&words[start..end]),
            position: chunks.len(),
            heading: heading_at(&headings, start),
        });

        if end == words.len() {
            break;
        }
        start = end.saturating_sub(options.overlap_size).max(start + 1);
    }

    debug!(words = words.len(), chunks = chunks.len(), "Chunked text");
    Ok(chunks)
}
