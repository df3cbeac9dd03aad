//! Corpus assembly and recursive text splitting.

use std::collections::VecDeque;

use serde::Serialize;

use crate::knowledge::KnowledgeRecord;

/// Boundaries tried in order before falling back to a hard character cut.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    /// Byte range of `text` in the corpus.
    pub start: usize,
    pub end: usize,
    /// Leading characters shared with the previous chunk.
    pub overlap: usize,
}

impl TextChunk {
    /// The part of the chunk not already covered by its predecessor.
    pub fn novel_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

/// Renders records as `Question/Answer/Link` blocks separated by blank lines.
pub fn build_corpus(records: &[KnowledgeRecord]) -> String {
    records
        .iter()
        .map(|record| {
            let mut block = format!("Question: {}\nAnswer: {}", record.question, record.answer);
            if let Some(link) = &record.link {
                block.push_str("\nLink: ");
                block.push_str(link);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, corpus: &str) -> Vec<TextChunk> {
        let mut pieces = Vec::new();
        self.collect_pieces(corpus, 0, 0, &mut pieces);

        let mut chunks = Vec::new();
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut window_chars = 0usize;
        let mut carried = 0usize;
        let mut has_fresh = false;

        for piece in pieces {
            if has_fresh && window_chars + piece.chars > self.chunk_size {
                chunks.push(self.emit(corpus, &window, chunks.len(), carried));
                has_fresh = false;

                while let Some(front) = window.front().copied() {
                    let over_overlap = window_chars > self.chunk_overlap;
                    let no_room = window_chars + piece.chars > self.chunk_size;
                    if !(over_overlap || no_room) {
                        break;
                    }
                    window.pop_front();
                    window_chars -= front.chars;
                }
                carried = window_chars;
            }

            window.push_back(piece);
            window_chars += piece.chars;
            has_fresh = true;
        }

        if has_fresh {
            chunks.push(self.emit(corpus, &window, chunks.len(), carried));
        }
        chunks
    }

    fn emit(&self, corpus: &str, window: &VecDeque<Piece>, index: usize, carried: usize) -> TextChunk {
        let start = window.front().map(|p| p.start).unwrap_or(0);
        let end = window.back().map(|p| p.end).unwrap_or(start);
        TextChunk {
            index,
            text: corpus[start..end].to_string(),
            start,
            end,
            overlap: carried,
        }
    }

    // Breaks `text` into pieces of at most `chunk_size` chars, keeping every
    // separator attached to the piece before it.
    fn collect_pieces(&self, text: &str, offset: usize, level: usize, out: &mut Vec<Piece>) {
        if text.is_empty() {
            return;
        }
        let chars = text.chars().count();
        if chars <= self.chunk_size {
            out.push(Piece {
                start: offset,
                end: offset + text.len(),
                chars,
            });
            return;
        }

        match SEPARATORS.get(level) {
            Some(separator) => {
                let mut position = offset;
                for part in text.split_inclusive(separator) {
                    self.collect_pieces(part, position, level + 1, out);
                    position += part.len();
                }
            }
            None => {
                let mut start = 0;
                let mut count = 0;
                for (byte, _) in text.char_indices() {
                    if count == self.chunk_size {
                        out.push(Piece {
                            start: offset + start,
                            end: offset + byte,
                            chars: count,
                        });
                        start = byte;
                        count = 0;
                    }
                    count += 1;
                }
                out.push(Piece {
                    start: offset + start,
                    end: offset + text.len(),
                    chars: count,
                });
            }
        }
    }
}
