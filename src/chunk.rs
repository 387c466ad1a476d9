//! Sentence-aware, header-aware text chunker.
//!
//! Splits extracted document text into [`Chunk`]s bounded by
//! `max_chunk_chars`, carrying a sentence-bounded overlap from the previous
//! chunk's tail so retrieval keeps context across boundaries.
//!
//! Chunk IDs are derived from the source file and the chunk index only, so
//! re-chunking a byte-identical file reproduces identical IDs and the
//! builder can diff ledger entries exactly.
//!
//! # Algorithm
//!
//! 1. Split each page on blank lines into paragraphs. Lines that look like
//!    headers (markdown `#`, short ALL-CAPS lines, `1. Scope`, `Section 4`,
//!    horizontal rules) become paragraphs of their own.
//! 2. Greedily pack paragraphs into a chunk until the next one would
//!    overflow. A header always opens a new chunk.
//! 3. Oversized paragraphs are split on sentence boundaries. An oversized
//!    sentence is split at its last semicolon when both halves fit, else on
//!    word boundaries, preferring a late comma in the accumulated piece.
//! 4. Chunks under `min_chunk_chars` are merged into a neighbour, or
//!    dropped when neither neighbour has room. A document with a single
//!    chunk keeps it regardless of size.
//! 5. Every chunk after the first, unless it opens with a header, is
//!    prefixed with the sentence-bounded tail of its predecessor, provided
//!    the result stays within 1.2 × `max_chunk_chars`.
//!
//! # Example
//!
//! ```rust
//! use siteindex::chunk::{Chunker, ChunkerConfig};
//! use siteindex::models::ExtractedDocument;
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let doc = ExtractedDocument::from_text("Hello world.\n\nSecond paragraph.");
//! let chunks = chunker.chunk("drawings/a.txt", "txt", &doc).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::ChunkingError;
use crate::models::{Chunk, ExtractedDocument};

pub const DEFAULT_MAX_CHUNK_CHARS: usize = 4000;
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 100;
pub const DEFAULT_OVERLAP_CHARS: usize = 200;

/// Lines longer than this are never treated as headers.
const MAX_HEADER_CHARS: usize = 100;
/// ALL-CAPS lines longer than this are treated as shouting prose.
const MAX_CAPS_HEADER_CHARS: usize = 60;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r\f]*\n").expect("valid regex"));

static HEADER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^#{1,6}\s+\S",
        r"^\d+(\.\d+)*\.?\s+[A-Z]",
        r"(?i)^(section|chapter|article|part|division)\s+[0-9IVXLC]+\b",
        r"^(-{3,}|\*{3,}|_{3,}|={3,})$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Chunk sizing parameters, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

fn default_max_chunk_chars() -> usize {
    DEFAULT_MAX_CHUNK_CHARS
}
fn default_min_chunk_chars() -> usize {
    DEFAULT_MIN_CHUNK_CHARS
}
fn default_overlap_chars() -> usize {
    DEFAULT_OVERLAP_CHARS
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            min_chunk_chars: DEFAULT_MIN_CHUNK_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_chunk_chars == 0 {
            return Err(ChunkingError::InvalidConfig(
                "max_chunk_chars must be > 0".to_string(),
            ));
        }
        if self.min_chunk_chars >= self.max_chunk_chars {
            return Err(ChunkingError::InvalidConfig(format!(
                "min_chunk_chars ({}) must be < max_chunk_chars ({})",
                self.min_chunk_chars, self.max_chunk_chars
            )));
        }
        if self.overlap_chars >= self.max_chunk_chars {
            return Err(ChunkingError::InvalidConfig(format!(
                "overlap_chars ({}) must be < max_chunk_chars ({})",
                self.overlap_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }

    /// Hard ceiling for a chunk including its overlap prefix.
    pub fn overlap_ceiling(&self) -> usize {
        self.max_chunk_chars + self.max_chunk_chars / 5
    }
}

/// Splits documents into bounded chunks. Stateless apart from its config.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkingError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk one extracted document.
    ///
    /// `source_file` is the `<source>/<relative path>` label used for chunk
    /// identity; `file_type` is copied into every chunk.
    ///
    /// Returns an empty vector only when the document has no text.
    pub fn chunk(
        &self,
        source_file: &str,
        file_type: &str,
        doc: &ExtractedDocument,
    ) -> Result<Vec<Chunk>, ChunkingError> {
        let max = self.config.max_chunk_chars;
        let paragraphs = split_paragraphs(doc);
        let drafts = pack(paragraphs, max);
        let drafts = merge_small(drafts, self.config.min_chunk_chars, max);

        for (index, draft) in drafts.iter().enumerate() {
            if draft.chars > max {
                return Err(ChunkingError::Oversized {
                    index,
                    len: draft.chars,
                    max,
                });
            }
        }

        let ceiling = self.config.overlap_ceiling();
        let total = drafts.len();
        let mut chunks = Vec::with_capacity(total);
        for (i, draft) in drafts.iter().enumerate() {
            let mut text = draft.text.clone();
            let mut overlap_chars = 0;
            if i > 0 && !draft.opens_with_header && self.config.overlap_chars > 0 {
                if let Some(tail) = sentence_tail(&drafts[i - 1].text, self.config.overlap_chars)
                {
                    let tail_len = char_len(tail);
                    if tail_len + 1 + draft.chars <= ceiling {
                        text = format!("{} {}", tail, draft.text);
                        overlap_chars = tail_len + 1;
                    }
                }
            }
            chunks.push(Chunk {
                id: chunk_id(source_file, i),
                text,
                source_file: source_file.to_string(),
                chunk_index: i,
                page_number: draft.page,
                total_chunks: total,
                file_type: file_type.to_string(),
                overlap_chars,
            });
        }

        Ok(chunks)
    }
}

/// Deterministic chunk identifier: `<slug>-<path hash>_<index:04>`.
///
/// The slug keeps IDs readable; the 8-hex-digit hash of the exact source
/// label keeps files whose names normalize identically apart.
pub fn chunk_id(source_file: &str, index: usize) -> String {
    let digest = Sha256::digest(source_file.as_bytes());
    format!(
        "{}-{}_{:04}",
        normalize_source_name(source_file),
        &hex::encode(digest)[..8],
        index
    )
}

/// Lower-case the label and collapse every run of non-alphanumerics to `_`.
pub fn normalize_source_name(source_file: &str) -> String {
    let mut out = String::with_capacity(source_file.len());
    let mut pending_sep = false;
    for c in source_file.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        out.push_str("doc");
    }
    out
}

/// Whether a single line reads as a section header.
pub fn is_header(line: &str) -> bool {
    let line = line.trim();
    let len = char_len(line);
    if line.is_empty() || len > MAX_HEADER_CHARS {
        return false;
    }
    if HEADER_PATTERNS.iter().any(|re| re.is_match(line)) {
        return true;
    }
    is_caps_header(line, len)
}

fn is_caps_header(line: &str, len: usize) -> bool {
    if len > MAX_CAPS_HEADER_CHARS || line.ends_with(['.', ',', ';']) {
        return false;
    }
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    letters >= 3 && !line.chars().any(char::is_lowercase)
}

#[derive(Debug)]
struct Paragraph {
    text: String,
    page: usize,
    is_header: bool,
}

#[derive(Debug)]
struct Draft {
    text: String,
    chars: usize,
    page: usize,
    opens_with_header: bool,
}

impl Draft {
    fn new(text: String, page: usize, opens_with_header: bool) -> Self {
        let chars = char_len(&text);
        Self {
            text,
            chars,
            page,
            opens_with_header,
        }
    }

    fn append(&mut self, other: Draft) {
        self.text.push_str("\n\n");
        self.text.push_str(&other.text);
        self.chars += 2 + other.chars;
    }

    fn prepend(&mut self, other: Draft) {
        self.text = format!("{}\n\n{}", other.text, self.text);
        self.chars += 2 + other.chars;
        self.page = other.page;
        self.opens_with_header = other.opens_with_header;
    }
}

fn split_paragraphs(doc: &ExtractedDocument) -> Vec<Paragraph> {
    let pages: Vec<&str> = if doc.pages.is_empty() {
        vec![doc.text.as_str()]
    } else {
        doc.pages.iter().map(String::as_str).collect()
    };

    let mut out = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        let page_number = page_idx + 1;
        for block in PARAGRAPH_BREAK.split(page) {
            let mut body: Vec<&str> = Vec::new();
            for line in block.lines() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if is_header(trimmed) {
                    flush_body(&mut out, &mut body, page_number);
                    out.push(Paragraph {
                        text: trimmed.to_string(),
                        page: page_number,
                        is_header: true,
                    });
                } else {
                    body.push(trimmed);
                }
            }
            flush_body(&mut out, &mut body, page_number);
        }
    }
    out
}

fn flush_body(out: &mut Vec<Paragraph>, body: &mut Vec<&str>, page: usize) {
    if body.is_empty() {
        return;
    }
    out.push(Paragraph {
        text: body.join("\n"),
        page,
        is_header: false,
    });
    body.clear();
}

fn pack(paragraphs: Vec<Paragraph>, max: usize) -> Vec<Draft> {
    let mut drafts = Vec::new();
    let mut current: Option<Draft> = None;

    for para in paragraphs {
        if para.is_header {
            drafts.extend(current.take());
        }

        let para_len = char_len(&para.text);
        if para_len > max {
            drafts.extend(current.take());
            let mut last = None;
            for (i, piece) in split_oversized(&para.text, max).into_iter().enumerate() {
                drafts.extend(last.take());
                last = Some(Draft::new(piece, para.page, para.is_header && i == 0));
            }
            current = last;
            continue;
        }

        match current.as_mut() {
            Some(draft) if draft.chars + 2 + para_len <= max => {
                draft.append(Draft::new(para.text, para.page, false));
            }
            _ => {
                drafts.extend(current.take());
                current = Some(Draft::new(para.text, para.page, para.is_header));
            }
        }
    }

    drafts.extend(current);
    drafts
}

fn merge_small(mut drafts: Vec<Draft>, min: usize, max: usize) -> Vec<Draft> {
    if drafts.len() <= 1 {
        return drafts;
    }

    let mut i = 0;
    while i < drafts.len() {
        if drafts[i].chars >= min {
            i += 1;
            continue;
        }
        let small_len = drafts[i].chars;
        let fits_prev = i > 0 && drafts[i - 1].chars + 2 + small_len <= max;
        let fits_next = i + 1 < drafts.len() && small_len + 2 + drafts[i + 1].chars <= max;

        if fits_next && (drafts[i].opens_with_header || !fits_prev) {
            let small = drafts.remove(i);
            drafts[i].prepend(small);
        } else if fits_prev {
            let small = drafts.remove(i);
            drafts[i - 1].append(small);
            i -= 1;
        } else if drafts.len() == 1 {
            break;
        } else {
            let dropped = drafts.remove(i);
            tracing::debug!(chars = dropped.chars, "dropping undersized chunk with no room to merge");
        }
    }
    drafts
}

/// Byte offsets just past each `.`, `!` or `?` that is followed by whitespace.
fn sentence_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    ends.push(i + c.len_utf8());
                }
            }
        }
    }
    ends
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for end in sentence_ends(text) {
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = end;
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn split_oversized(text: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let sentence_len = char_len(sentence);
        if sentence_len > max {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            pieces.extend(split_long_sentence(sentence, max));
            continue;
        }
        if !current.is_empty() && current_len + 1 + sentence_len > max {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(sentence);
        current_len += sentence_len;
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn split_long_sentence(sentence: &str, max: usize) -> Vec<String> {
    if let Some(pos) = sentence.rfind(';') {
        let left = sentence[..=pos].trim();
        let right = sentence[pos + 1..].trim();
        if !left.is_empty()
            && !right.is_empty()
            && char_len(left) <= max
            && char_len(right) <= max
        {
            return vec![left.to_string(), right.to_string()];
        }
    }
    split_on_words(sentence, max)
}

fn split_on_words(sentence: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in sentence.split_whitespace() {
        let word_len = char_len(word);
        let fits = current.is_empty() || char_len(&current) + 1 + word_len <= max;
        if fits && word_len <= max {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            continue;
        }

        if !current.is_empty() {
            match late_comma(&current) {
                Some(cut) => {
                    let tail = current[cut..].trim_start().to_string();
                    current.truncate(cut);
                    pieces.push(std::mem::replace(&mut current, tail));
                }
                None => pieces.push(std::mem::take(&mut current)),
            }
        }

        if word_len > max {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            let mut parts: Vec<String> = chars.chunks(max).map(|c| c.iter().collect()).collect();
            current = parts.pop().unwrap_or_default();
            pieces.extend(parts);
        } else if !current.is_empty() && char_len(&current) + 1 + word_len <= max {
            current.push(' ');
            current.push_str(word);
        } else {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Byte offset just past the last comma in the back half of `text`.
fn late_comma(text: &str) -> Option<usize> {
    let pos = text.rfind(',')?;
    (pos >= text.len() / 2).then_some(pos + 1)
}

/// The tail of `text`, at most `max_chars` long, trimmed to start after a
/// sentence boundary and to end on sentence punctuation.
fn sentence_tail(text: &str, max_chars: usize) -> Option<&str> {
    let total = char_len(text);
    let window_start = if total <= max_chars {
        0
    } else {
        text.char_indices()
            .nth(total - max_chars)
            .map(|(i, _)| i)
            .unwrap_or(text.len())
    };
    let window = &text[window_start..];

    let begin = if window_start == 0 {
        0
    } else {
        // A window that starts right after sentence punctuation begins on a boundary.
        let on_boundary = text[..window_start]
            .trim_end()
            .ends_with(['.', '!', '?'])
            && text[..window_start].ends_with(char::is_whitespace);
        if on_boundary {
            0
        } else {
            *sentence_ends(window).first()?
        }
    };

    let rest = window[begin..].trim_end();
    // Punctuation inside a token ("3.5") is not a boundary; a final mark is.
    let end = if rest.ends_with(['.', '!', '?']) {
        rest.len()
    } else {
        *sentence_ends(rest).last()?
    };
    let tail = rest[..end].trim();
    (!tail.is_empty()).then_some(tail)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &str = "Verify all site dimensions before fabrication now.";

    /// Prose of roughly `chars` length built from whole sentences.
    fn prose(chars: usize) -> String {
        let mut out = String::new();
        while out.len() + SENTENCE.len() + 1 <= chars {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(SENTENCE);
        }
        out
    }

    fn chunker(max: usize, min: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            max_chunk_chars: max,
            min_chunk_chars: min,
            overlap_chars: overlap,
        })
        .unwrap()
    }

    fn chunk_text(c: &Chunker, text: &str) -> Vec<Chunk> {
        c.chunk("specs/doc.txt", "txt", &ExtractedDocument::from_text(text))
            .unwrap()
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let c = chunker(4000, 100, 200);
        assert!(chunk_text(&c, "").is_empty());
        assert!(chunk_text(&c, "   \n\n \n").is_empty());
    }

    #[test]
    fn test_short_document_yields_one_chunk() {
        let c = chunker(4000, 100, 200);
        let chunks = chunk_text(&c, "Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].overlap_chars, 0);
    }

    #[test]
    fn test_paragraphs_under_limit_pack_together() {
        let c = chunker(4000, 10, 200);
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = chunk_text(&c, text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph"));
        assert!(chunks[0].text.contains("Third paragraph"));
    }

    #[test]
    fn test_three_large_paragraphs_carry_overlap() {
        let c = chunker(4000, 100, 200);
        let para = prose(3000);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = chunk_text(&c, &text);

        // 3 × ~3000 chars cannot fit in two 4000-char bodies.
        assert_eq!(chunks.len(), 3);
        let second = &chunks[1];
        assert!(second.overlap_chars > 0);
        let overlap: String = second.text.chars().take(second.overlap_chars - 1).collect();
        assert!(overlap.ends_with('.'));
        assert!(overlap.starts_with("Verify"));
        assert!(chunks[0].text.ends_with(&overlap));
        assert!(char_len(&overlap) <= 200);
        assert_eq!(second.body(), para);
    }

    #[test]
    fn test_overlap_ignores_decimal_point() {
        let c = chunker(200, 10, 120);
        let first = format!(
            "{SENTENCE} {SENTENCE} Footings are sized per clause 3.5 of the geotechnical report"
        );
        let text = format!("{first}\n\n{}", prose(150));
        let chunks = chunk_text(&c, &text);

        assert_eq!(chunks.len(), 2);
        let second = &chunks[1];
        let overlap: String = second.text.chars().take(second.overlap_chars - 1).collect();
        assert_eq!(overlap, SENTENCE);
        assert!(!second.text.contains("clause 3."));
    }

    #[test]
    fn test_overlap_skipped_without_whole_sentence() {
        assert_eq!(sentence_tail("sized per clause 3.5 of the report", 120), None);
        assert_eq!(
            sentence_tail("Footings per clause 3.5 apply.", 120),
            Some("Footings per clause 3.5 apply.")
        );
    }

    #[test]
    fn test_header_forces_new_chunk_without_overlap() {
        let c = chunker(4000, 20, 200);
        let text = format!(
            "{}\n\n# Section Two\n\n{}",
            prose(300),
            prose(300)
        );
        let chunks = chunk_text(&c, &text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("# Section Two"));
        assert_eq!(chunks[1].overlap_chars, 0);
    }

    #[test]
    fn test_header_line_inside_block_is_split_off() {
        let c = chunker(4000, 20, 0);
        let text = format!("{}\nGENERAL REQUIREMENTS\n{}", prose(200), prose(200));
        let chunks = chunk_text(&c, &text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("GENERAL REQUIREMENTS"));
    }

    #[test]
    fn test_header_patterns() {
        assert!(is_header("# Introduction"));
        assert!(is_header("### 2.1 Scope"));
        assert!(is_header("GENERAL CONDITIONS"));
        assert!(is_header("1. Introduction"));
        assert!(is_header("3.2.1 Concrete Works"));
        assert!(is_header("Section 4"));
        assert!(is_header("CHAPTER IV"));
        assert!(is_header("---"));
        assert!(is_header("***"));

        assert!(!is_header("The contractor shall verify dimensions."));
        assert!(!is_header("NOTE."));
        assert!(!is_header("A1"));
        assert!(!is_header(""));
        assert!(!is_header(&"SHOUTING ".repeat(10)));
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let c = chunker(500, 50, 0);
        let chunks = chunk_text(&c, &prose(2000));
        assert!(chunks.len() >= 4);
        for chunk in &chunks {
            assert!(char_len(&chunk.text) <= 500);
            assert!(chunk.text.ends_with('.'), "not sentence-bounded: {}", chunk.text);
        }
    }

    #[test]
    fn test_long_sentence_splits_at_last_semicolon() {
        let left = "alpha ".repeat(30);
        let right = "omega ".repeat(30);
        let sentence = format!("{}; {}", left.trim(), right.trim());
        let pieces = split_long_sentence(&sentence, 200);
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].ends_with(';'));
        assert!(pieces[1].starts_with("omega"));
    }

    #[test]
    fn test_long_sentence_prefers_late_comma() {
        // No semicolon; a comma sits in the back half of the first piece.
        let sentence = format!(
            "{}, {}",
            "beam ".repeat(14).trim(),
            "column ".repeat(20).trim()
        );
        let pieces = split_long_sentence(&sentence, 100);
        assert!(pieces.len() >= 2);
        assert!(pieces[0].ends_with(','), "expected comma split: {:?}", pieces);
        for piece in &pieces {
            assert!(char_len(piece) <= 100);
        }
    }

    #[test]
    fn test_long_sentence_falls_back_to_words() {
        let sentence = "rebar ".repeat(100);
        let pieces = split_long_sentence(sentence.trim(), 64);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(char_len(piece) <= 64);
            assert!(!piece.starts_with(' ') && !piece.ends_with(' '));
        }
        assert_eq!(pieces.join(" "), sentence.trim());
    }

    #[test]
    fn test_giant_word_is_hard_split() {
        let word = "x".repeat(250);
        let pieces = split_on_words(&word, 100);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| char_len(p) <= 100));
    }

    #[test]
    fn test_size_bounds_hold() {
        let c = chunker(300, 40, 80);
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("{}. Item {}\n\n", i + 1, i));
            text.push_str(&prose(50 + (i * 37) % 700));
            text.push_str("\n\n");
        }
        let chunks = chunk_text(&c, &text);
        assert!(chunks.len() > 10);
        for chunk in &chunks {
            assert!(char_len(chunk.body()) <= 300, "body too long: {}", chunk.body());
            assert!(char_len(&chunk.text) <= c.config().overlap_ceiling());
            assert!(char_len(chunk.body()) >= 40, "tiny chunk: {:?}", chunk.body());
        }
    }

    #[test]
    fn test_tiny_trailing_section_is_merged() {
        let c = chunker(4000, 100, 0);
        let text = format!("{}\n\n# Notes\n\nSee above.", prose(600));
        let chunks = chunk_text(&c, &text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with("# Notes\n\nSee above."));
    }

    #[test]
    fn test_chunk_ids_deterministic() {
        let c = chunker(200, 20, 50);
        let text = prose(1500);
        let a = chunk_text(&c, &text);
        let b = chunk_text(&c, &text);
        assert_eq!(a, b);
        for (i, chunk) in a.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.id, chunk_id("specs/doc.txt", i));
            assert_eq!(chunk.total_chunks, a.len());
        }
    }

    #[test]
    fn test_chunk_id_format() {
        let id = chunk_id("Site A/Drawings/Level 2 Plan.PDF", 7);
        assert!(id.starts_with("site_a_drawings_level_2_plan_pdf-"));
        assert!(id.ends_with("_0007"));
        assert_ne!(chunk_id("a-b.pdf", 0), chunk_id("a_b.pdf", 0));
    }

    #[test]
    fn test_page_numbers_follow_segments() {
        let c = chunker(400, 20, 0);
        let doc = ExtractedDocument::from_pages(vec![prose(300), prose(300), prose(300)]);
        let chunks = c.chunk("a/b.pdf", "pdf", &doc).unwrap();
        let pages: Vec<usize> = chunks.iter().map(|c| c.page_number).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert!(chunks.iter().all(|c| c.file_type == "pdf"));
    }

    #[test]
    fn test_multibyte_utf8() {
        let c = chunker(40, 5, 10);
        let text = "Überprüfung der Maße erforderlich. ".repeat(10);
        let chunks = chunk_text(&c, &text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(char_len(chunk.body()) <= 40);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = ChunkerConfig {
            max_chunk_chars: 100,
            min_chunk_chars: 100,
            overlap_chars: 10,
        };
        assert!(matches!(
            Chunker::new(bad),
            Err(ChunkingError::InvalidConfig(_))
        ));
    }
}
