/// Maps a chunk's log offset to an event that chunk produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DrawcallUse {
    pub offset: u64,
    pub event_id: u32,
}

impl DrawcallUse {
    pub fn new(offset: u64, event_id: u32) -> Self {
        Self { offset, event_id }
    }
}

/// `DrawcallUse` entries kept sorted by `(offset, event_id)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawcallUseIndex {
    uses: Vec<DrawcallUse>,
}

impl DrawcallUseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends in the common case; entries that arrive out of order (a secondary command buffer
    /// executed a second time) are inserted at their sorted position.
    pub fn push(&mut self, entry: DrawcallUse) {
        match self.uses.last() {
            Some(last) if *last > entry => {
                let pos = self.uses.partition_point(|u| *u < entry);
                self.uses.insert(pos, entry);
            }
            _ => self.uses.push(entry),
        }
    }

    /// First entry at or after `offset`.
    pub fn lower_bound(&self, offset: u64) -> Option<DrawcallUse> {
        let key = DrawcallUse::new(offset, 0);
        let pos = self.uses.partition_point(|u| *u < key);
        self.uses.get(pos).copied()
    }

    /// Event of the first draw produced by the chunk at exactly `offset`.
    pub fn event_at(&self, offset: u64) -> Option<u32> {
        self.lower_bound(offset)
            .filter(|u| u.offset == offset)
            .map(|u| u.event_id)
    }

    pub fn len(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }

    pub fn as_slice(&self) -> &[DrawcallUse] {
        &self.uses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_bound_finds_first_event_of_a_chunk() {
        let mut index = DrawcallUseIndex::new();
        index.push(DrawcallUse::new(24, 1));
        index.push(DrawcallUse::new(60, 3));
        index.push(DrawcallUse::new(60, 4));
        index.push(DrawcallUse::new(60, 5));
        index.push(DrawcallUse::new(120, 7));

        assert_eq!(index.lower_bound(60), Some(DrawcallUse::new(60, 3)));
        assert_eq!(index.lower_bound(61), Some(DrawcallUse::new(120, 7)));
        assert_eq!(index.lower_bound(121), None);
        assert_eq!(index.event_at(60), Some(3));
        assert_eq!(index.event_at(61), None);
    }

    #[test]
    fn out_of_order_entries_stay_sorted() {
        let mut index = DrawcallUseIndex::new();
        index.push(DrawcallUse::new(100, 10));
        index.push(DrawcallUse::new(200, 11));
        index.push(DrawcallUse::new(100, 20));

        let offsets: Vec<_> = index.as_slice().iter().map(|u| (u.offset, u.event_id)).collect();
        assert_eq!(offsets, vec![(100, 10), (100, 20), (200, 11)]);
    }
}
