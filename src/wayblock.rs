//! Way-reference block allocator.
//!
//! Each block holds 32 `i32` way references plus a `next` chain link.
//! `refs[31]` doubles as an occupancy tally when the block is not yet
//! full: a negative value `-k` means `k` slots remain free, occupying
//! the prefix `refs[0 .. 32 - k]`. Block index 0 is reserved as null.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, VexError};
use crate::region::{Backing, SparseRegion};

pub const BLOCK_SLOTS: usize = 32;
const BLOCK_BYTES: usize = BLOCK_SLOTS * 4 + 4; // refs[32] + next
const NULL_BLOCK: u32 = 0;

pub struct WayBlockStore {
    region: SparseRegion,
    max_blocks: u64,
    next_free: u64,
}

impl WayBlockStore {
    pub fn open(backing: &Backing, max_blocks: u64) -> Result<Self> {
        let size = max_blocks * BLOCK_BYTES as u64;
        let region = backing.region("way_blocks", size)?;
        Ok(WayBlockStore {
            region,
            max_blocks,
            next_free: 1, // index 0 is reserved null
        })
    }

    fn block_offset(idx: u32) -> usize {
        idx as usize * BLOCK_BYTES
    }

    fn refs_at(&self, idx: u32, slot: usize) -> i32 {
        let off = Self::block_offset(idx) + slot * 4;
        LittleEndian::read_i32(&self.region.as_slice()[off..off + 4])
    }

    fn set_ref(&mut self, idx: u32, slot: usize, val: i32) {
        let off = Self::block_offset(idx) + slot * 4;
        LittleEndian::write_i32(&mut self.region.as_mut_slice()[off..off + 4], val);
    }

    fn next_of(&self, idx: u32) -> u32 {
        let off = Self::block_offset(idx) + BLOCK_SLOTS * 4;
        LittleEndian::read_u32(&self.region.as_slice()[off..off + 4])
    }

    fn set_next(&mut self, idx: u32, next: u32) {
        let off = Self::block_offset(idx) + BLOCK_SLOTS * 4;
        LittleEndian::write_u32(&mut self.region.as_mut_slice()[off..off + 4], next);
    }

    /// Allocates a fresh block, initialized with 32 free slots, and
    /// returns its index.
    pub fn allocate(&mut self) -> Result<u32> {
        if self.next_free >= self.max_blocks {
            return Err(VexError::WayBlockCapacityExceeded {
                count: self.next_free,
            });
        }
        let idx = self.next_free as u32;
        self.next_free += 1;
        self.set_ref(idx, BLOCK_SLOTS - 1, -(BLOCK_SLOTS as i32));
        self.set_next(idx, NULL_BLOCK);
        Ok(idx)
    }

    /// Inserts `way_id` into the chain whose current head is `*head`,
    /// allocating a new head block if necessary. Updates `*head` in
    /// place.
    pub fn insert(&mut self, head: &mut u32, way_id: i32) -> Result<()> {
        if *head == NULL_BLOCK {
            *head = self.allocate()?;
        }

        let tally = self.refs_at(*head, BLOCK_SLOTS - 1);
        let target = if tally >= 0 {
            // head block is full: allocate a new block and chain it in
            // front (head-of-chain insertion).
            let new_head = self.allocate()?;
            self.set_next(new_head, *head);
            *head = new_head;
            new_head
        } else {
            *head
        };

        let nfree = self.refs_at(target, BLOCK_SLOTS - 1);
        debug_assert!(nfree < 0);
        let slot = (BLOCK_SLOTS as i32 + nfree) as usize;
        self.set_ref(target, slot, way_id);
        if nfree < -1 {
            self.set_ref(target, BLOCK_SLOTS - 1, nfree + 1);
        }
        // nfree == -1: that slot *was* the tally; it now holds way_id and
        // the block is full (refs[31] >= 0 going forward).
        Ok(())
    }

    /// Walks the chain starting at `head`, invoking `callback` with each
    /// stored way ID, stopping each block's scan at the first
    /// non-positive entry.
    pub fn enumerate(&self, head: u32, mut callback: impl FnMut(i32)) {
        let mut block = head;
        while block != NULL_BLOCK {
            for slot in 0..BLOCK_SLOTS {
                let v = self.refs_at(block, slot);
                if v <= 0 {
                    break;
                }
                callback(v);
            }
            block = self.next_of(block);
        }
    }

    pub fn block_count(&self) -> u64 {
        self.next_free - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_insert_then_enumerate() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut store = WayBlockStore::open(&backing, 1024).unwrap();
        let mut head = 0u32;
        store.insert(&mut head, 7).unwrap();
        store.insert(&mut head, 9).unwrap();
        let mut seen = Vec::new();
        store.enumerate(head, |w| seen.push(w));
        assert_eq!(seen, vec![7, 9]);
    }

    #[test]
    fn overflow_chains_into_new_block() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut store = WayBlockStore::open(&backing, 1024).unwrap();
        let mut head = 0u32;
        for i in 1..=33 {
            store.insert(&mut head, i).unwrap();
        }
        let mut seen = Vec::new();
        store.enumerate(head, |w| seen.push(w));
        assert_eq!(seen.len(), 33);
        assert_eq!(store.block_count(), 2);
    }

    #[test]
    fn capacity_exceeded_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut store = WayBlockStore::open(&backing, 2).unwrap();
        let mut head = 0u32;
        store.insert(&mut head, 1).unwrap();
        // second insert needs a second block (head is already full-ish
        // path not hit here, but allocate() alone exhausts max_blocks=2
        // after the implicit head allocation above).
        for i in 2..=33 {
            let _ = store.insert(&mut head, i);
        }
        assert!(store.block_count() <= 2);
    }
}
