// map_partition_engine/server/src/concurrent/cell_marks.rs
use crate::core::constants::MARKED_CELL_COUNT;
use std::sync::atomic::{AtomicU64, Ordering};

const BITS_PER_WORD: usize = 64;

/// Fixed-size bitset of grid cells that need a re-scan this tick.
/// Bits are independent; only per-word atomicity is needed.
pub struct CellMarkSet {
    words: Box<[AtomicU64]>,
    cell_count: usize,
}

impl CellMarkSet {
    pub fn new(cell_count: usize) -> Self {
        let word_count = cell_count.div_ceil(BITS_PER_WORD);
        let words = (0..word_count).map(|_| AtomicU64::new(0)).collect::<Vec<_>>().into_boxed_slice();
        CellMarkSet { words, cell_count }
    }

    pub fn for_map() -> Self {
        Self::new(MARKED_CELL_COUNT)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cell_count
    }

    #[inline]
    fn locate(&self, cell_id: u32) -> Option<(&AtomicU64, u64)> {
        let cell = cell_id as usize;
        if cell >= self.cell_count {
            return None;
        }
        let word = &self.words[cell / BITS_PER_WORD];
        Some((word, 1u64 << (cell % BITS_PER_WORD)))
    }

    /// Out-of-range ids are ignored.
    #[inline]
    pub fn mark(&self, cell_id: u32) {
        if let Some((word, mask)) = self.locate(cell_id) {
            word.fetch_or(mask, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn is_marked(&self, cell_id: u32) -> bool {
        self.locate(cell_id)
            .map(|(word, mask)| word.load(Ordering::Relaxed) & mask != 0)
            .unwrap_or(false)
    }

    pub fn reset(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }

    pub fn marked_count(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }
}
