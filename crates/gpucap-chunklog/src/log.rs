use std::ops::Range;

use crate::chunk::Chunk;
use crate::format::LOG_HEADER_SIZE;

/// Append-only, ordered sequence of chunks.
///
/// Real chunks are assigned the byte offset they occupy when the log is serialized; synthetic
/// chunks take up no space on disk and keep whatever offset their template carried.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkLog {
    chunks: Vec<Chunk>,
    next_offset: u64,
}

impl Default for ChunkLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkLog {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            next_offset: LOG_HEADER_SIZE as u64,
        }
    }

    /// Appends a chunk and returns its index. Real chunks get their offset assigned here.
    pub fn append(&mut self, mut chunk: Chunk) -> usize {
        if !chunk.is_synthetic() {
            chunk.offset = self.next_offset;
            self.next_offset += chunk.encoded_len();
        }
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }

    /// Appends a chunk whose offset was already established (e.g. read back from disk).
    pub(crate) fn append_at_offset(&mut self, chunk: Chunk) {
        if !chunk.is_synthetic() {
            self.next_offset = chunk.offset + chunk.encoded_len();
        }
        self.chunks.push(chunk);
    }

    /// Inserts a chunk immediately before the most recently appended one.
    ///
    /// Used for synthetic chunks only; inserting a real chunk out of order would invalidate the
    /// offsets already handed out.
    pub fn insert_before_last(&mut self, chunk: Chunk) -> usize {
        debug_assert!(chunk.is_synthetic());
        let idx = self.chunks.len().saturating_sub(1);
        self.chunks.insert(idx, chunk);
        idx
    }

    /// Replaces the chunks in `range` with `chunks`, which hold the same real chunks in the same
    /// order with synthetic chunks interleaved. Returns how many chunks were added.
    pub fn interleave_synthetic(&mut self, range: Range<usize>, chunks: Vec<Chunk>) -> usize {
        debug_assert!(chunks
            .iter()
            .filter(|c| !c.is_synthetic())
            .eq(self.chunks[range.clone()].iter().filter(|c| !c.is_synthetic())));
        let added = chunks.len().saturating_sub(range.len());
        self.chunks.splice(range, chunks);
        added
    }

    pub fn back(&self) -> Option<&Chunk> {
        self.chunks.last()
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Chunk> {
        self.chunks.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.chunks.iter()
    }

    /// Chunks that exist in the serialized log.
    pub fn real_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| !c.is_synthetic())
    }

    /// Size of the log once serialized.
    pub fn serialized_len(&self) -> u64 {
        self.next_offset
    }
}

impl<'a> IntoIterator for &'a ChunkLog {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkFlags, ChunkKind, FieldValue};

    fn real(kind: u16) -> Chunk {
        Chunk::new(ChunkKind(kind)).with_field("v", FieldValue::U32(kind as u32))
    }

    fn synthetic(template: &Chunk) -> Chunk {
        let mut c = Chunk::new(ChunkKind(0xFFFF));
        c.flags = ChunkFlags::SYNTHETIC;
        c.offset = template.offset;
        c
    }

    #[test]
    fn offsets_follow_encoded_sizes() {
        let mut log = ChunkLog::new();
        log.append(real(1));
        log.append(real(2));

        let first = log.get(0).unwrap();
        let second = log.get(1).unwrap();
        assert_eq!(first.offset, LOG_HEADER_SIZE as u64);
        assert_eq!(second.offset, first.offset + first.encoded_len());
        assert_eq!(log.serialized_len(), second.offset + second.encoded_len());
    }

    #[test]
    fn synthetic_chunks_do_not_advance_offsets() {
        let mut log = ChunkLog::new();
        log.append(real(1));
        let template = log.back().unwrap().clone();
        log.append(synthetic(&template));
        log.append(real(2));

        assert_eq!(log.get(1).unwrap().offset, template.offset);
        assert_eq!(
            log.get(2).unwrap().offset,
            template.offset + template.encoded_len()
        );
        assert_eq!(log.real_chunks().count(), 2);
    }

    #[test]
    fn interleaving_keeps_later_chunks_and_offsets() {
        let mut log = ChunkLog::new();
        log.append(real(1));
        log.append(real(2));
        log.append(real(3));
        let first = log.get(0).unwrap().clone();
        let second = log.get(1).unwrap().clone();
        let third_offset = log.get(2).unwrap().offset;

        let baked = vec![
            first.clone(),
            synthetic(&first),
            synthetic(&first),
            second,
        ];
        assert_eq!(log.interleave_synthetic(0..2, baked), 2);
        assert_eq!(log.len(), 5);
        assert!(log.get(1).unwrap().is_synthetic());
        assert_eq!(log.get(4).unwrap().offset, third_offset);
        assert_eq!(log.real_chunks().count(), 3);
    }

    #[test]
    fn insert_before_last_places_chunk_ahead_of_back() {
        let mut log = ChunkLog::new();
        log.append(real(1));
        log.append(real(2));
        let template = log.back().unwrap().clone();

        let idx = log.insert_before_last(synthetic(&template));
        assert_eq!(idx, 1);
        assert!(log.get(1).unwrap().is_synthetic());
        assert_eq!(log.back().unwrap().kind, ChunkKind(2));
        assert_eq!(log.len(), 3);
    }
}
