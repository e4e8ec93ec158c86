//! Document chunking for embedding.
//!
//! Splits a body into chunks of at most `MAX_CHUNK_BYTES` UTF-8 bytes,
//! preferring natural boundaries. Chunks partition the body exactly:
//! concatenating the chunk texts reproduces the input byte for byte.

/// A single chunk of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk index (0, 1, 2, ...)
    pub seq: usize,
    /// Character offset of the chunk start in the original body
    pub pos: usize,
    /// Chunk text
    pub text: String,
}

/// Default maximum chunk size in UTF-8 bytes.
pub const MAX_CHUNK_BYTES: usize = 6144;

/// Sentence terminators considered split points, all two bytes long.
const SENTENCE_ENDS: [&str; 6] = [". ", ".\n", "? ", "?\n", "! ", "!\n"];

/// Split a document into chunks of at most `max_bytes` UTF-8 bytes each.
///
/// A body that already fits is returned whole. Otherwise the splitter
/// takes the largest character-aligned slice within the byte budget and
/// pulls the cut back to a natural boundary when one sits late enough in
/// the slice: a paragraph break past the midpoint, a sentence end past
/// the midpoint, a newline past 30%, or a space past 30%. Positions are
/// character offsets into the original body.
pub fn chunk_document(body: &str, max_bytes: usize) -> Vec<Chunk> {
    if body.len() <= max_bytes {
        return vec![Chunk {
            seq: 0,
            pos: 0,
            text: body.to_string(),
        }];
    }

    // Byte offset of every character, with a sentinel at the end, so
    // char positions and byte positions convert both ways in O(1).
    let mut char_starts: Vec<usize> = body.char_indices().map(|(b, _)| b).collect();
    char_starts.push(body.len());
    let total_chars = char_starts.len() - 1;

    let mut chunks = Vec::new();
    let mut char_pos = 0usize;

    while char_pos < total_chars {
        // Widest slice that stays within the byte budget
        let mut end_pos = char_pos;
        while end_pos < total_chars
            && char_starts[end_pos + 1] - char_starts[char_pos] <= max_bytes
        {
            end_pos += 1;
        }

        let slice = &body[char_starts[char_pos]..char_starts[end_pos]];

        if end_pos < total_chars {
            if let Some(cut_bytes) = find_boundary(slice) {
                let cut_chars = slice[..cut_bytes].chars().count();
                if cut_chars > 0 {
                    end_pos = char_pos + cut_chars;
                }
            }
        }

        // Progress guard: always at least one character
        if end_pos <= char_pos {
            end_pos = char_pos + 1;
        }

        chunks.push(Chunk {
            seq: chunks.len(),
            pos: char_pos,
            text: body[char_starts[char_pos]..char_starts[end_pos]].to_string(),
        });
        char_pos = end_pos;
    }

    chunks
}

/// Byte offset within `slice` to cut at, or None to keep the full slice.
fn find_boundary(slice: &str) -> Option<usize> {
    let len = slice.len();
    let half = len / 2;
    let third = len * 3 / 10;

    // Paragraph break past the midpoint, split after it
    if let Some(idx) = slice.rfind("\n\n") {
        if idx > half {
            return Some(idx + 2);
        }
    }

    // Last sentence terminator past the midpoint
    let sentence = SENTENCE_ENDS
        .iter()
        .filter_map(|p| slice.rfind(p))
        .max();
    if let Some(idx) = sentence {
        if idx > half {
            return Some(idx + 2);
        }
    }

    // Line break past 30%
    if let Some(idx) = slice.rfind('\n') {
        if idx > third {
            return Some(idx + 1);
        }
    }

    // Word break past 30%
    if let Some(idx) = slice.rfind(' ') {
        if idx > third {
            return Some(idx + 1);
        }
    }

    None
}
