//! Sliding-window transcript chunking.
//!
//! Splits batch text into overlapping token windows so each extraction call
//! sees enough surrounding context to wire new nodes into the existing graph.

use threadline_shared::{Chunk, ChunkSet, Result, ThreadlineError};

/// Split `text` into overlapping windows of `size` whitespace tokens, each
/// window starting `size - overlap` tokens after the previous one. The final
/// window may be shorter than `size`.
///
/// `size > overlap` is a configuration requirement and fails immediately;
/// it is not retryable.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<ChunkSet> {
    if size == 0 {
        return Err(ThreadlineError::validation("chunk size must be non-zero"));
    }
    if size <= overlap {
        return Err(ThreadlineError::validation(format!(
            "chunk size ({size}) must be greater than overlap ({overlap})"
        )));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        chunks.push(Chunk::new(words[start..end].join(" "), chunks.len()));
        start += step;
    }

    Ok(ChunkSet { chunks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (1..=n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn windows_start_at_expected_offsets() {
        // size=4, overlap=1 over 10 words → starts at 0, 3, 6, 9
        let set = chunk(&words(10), 4, 1).expect("chunk");
        assert_eq!(set.len(), 4);
        assert_eq!(set.chunks[0].text, "w1 w2 w3 w4");
        assert_eq!(set.chunks[1].text, "w4 w5 w6 w7");
        assert_eq!(set.chunks[2].text, "w7 w8 w9 w10");
        assert_eq!(set.chunks[3].text, "w10");
    }

    #[test]
    fn tail_segments_reconstruct_input() {
        let input = words(10);
        let set = chunk(&input, 4, 1).expect("chunk");

        // Dropping each window's leading overlap tokens and concatenating
        // must reproduce the original sequence in order.
        let mut rebuilt: Vec<String> = Vec::new();
        for (i, c) in set.chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { 1 };
            rebuilt.extend(c.text.split_whitespace().skip(skip).map(String::from));
        }
        assert_eq!(rebuilt.join(" "), input);
    }

    #[test]
    fn ordinals_track_position() {
        let set = chunk(&words(10), 4, 1).expect("chunk");
        let ordinals: Vec<usize> = set.chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn no_overlap_is_allowed() {
        let set = chunk(&words(9), 3, 0).expect("chunk");
        assert_eq!(set.len(), 3);
        assert_eq!(set.chunks[1].text, "w4 w5 w6");
    }

    #[test]
    fn short_input_yields_single_window() {
        let set = chunk("hello world", 100, 10).expect("chunk");
        assert_eq!(set.len(), 1);
        assert_eq!(set.chunks[0].text, "hello world");
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let set = chunk("   ", 4, 1).expect("chunk");
        assert!(set.is_empty());
    }

    #[test]
    fn size_not_greater_than_overlap_fails_fast() {
        let err = chunk("a b c", 4, 4).unwrap_err();
        assert!(err.to_string().contains("greater than overlap"));

        assert!(chunk("a b c", 3, 5).is_err());
        assert!(chunk("a b c", 0, 0).is_err());
    }

    #[test]
    fn chunk_ids_are_unique_and_opaque() {
        let set = chunk(&words(10), 4, 1).expect("chunk");
        let mut ids: Vec<&str> = set.chunks.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}
