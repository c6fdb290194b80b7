//! Dense, ID-indexed arrays for nodes, ways, and the global node-ref
//! list. Each is a flat record layout over a `SparseRegion`; holes left
//! by unused IDs cost no disk space thanks to sparse-file semantics.

use byteorder::{ByteOrder, LittleEndian};

use crate::coord::Coord;
use crate::error::{Result, VexError};
use crate::region::{Backing, SparseRegion};

const NODE_RECORD_BYTES: u64 = 12; // x:i32, y:i32, tags_offset:u32
const WAY_RECORD_BYTES: u64 = 8; // first_ref_index:u32, tags_offset:u32
const NODE_REF_BYTES: u64 = 8; // i64

pub struct NodeStore {
    region: SparseRegion,
    max_id: u64,
}

impl NodeStore {
    pub fn open(backing: &Backing, max_id: u64) -> Result<Self> {
        let region = backing.region("nodes", max_id * NODE_RECORD_BYTES)?;
        Ok(NodeStore { region, max_id })
    }

    fn check_id(&self, id: u64) -> Result<()> {
        if id >= self.max_id {
            return Err(VexError::NodeIdOutOfBounds { id });
        }
        Ok(())
    }

    pub fn set(&mut self, id: u64, coord: Coord, tags_offset: u32) -> Result<()> {
        self.check_id(id)?;
        let off = (id * NODE_RECORD_BYTES) as usize;
        let buf = &mut self.region.as_mut_slice()[off..off + NODE_RECORD_BYTES as usize];
        LittleEndian::write_i32(&mut buf[0..4], coord.x);
        LittleEndian::write_i32(&mut buf[4..8], coord.y);
        LittleEndian::write_u32(&mut buf[8..12], tags_offset);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Result<(Coord, u32)> {
        self.check_id(id)?;
        let off = (id * NODE_RECORD_BYTES) as usize;
        let buf = &self.region.as_slice()[off..off + NODE_RECORD_BYTES as usize];
        let coord = Coord {
            x: LittleEndian::read_i32(&buf[0..4]),
            y: LittleEndian::read_i32(&buf[4..8]),
        };
        let tags_offset = LittleEndian::read_u32(&buf[8..12]);
        Ok((coord, tags_offset))
    }
}

pub struct WayStore {
    region: SparseRegion,
    max_id: u64,
}

impl WayStore {
    pub fn open(backing: &Backing, max_id: u64) -> Result<Self> {
        let region = backing.region("ways", max_id * WAY_RECORD_BYTES)?;
        Ok(WayStore { region, max_id })
    }

    fn check_id(&self, id: u64) -> Result<()> {
        if id >= self.max_id {
            return Err(VexError::WayIdOutOfBounds { id });
        }
        Ok(())
    }

    pub fn set(&mut self, id: u64, first_ref_index: u32, tags_offset: u32) -> Result<()> {
        self.check_id(id)?;
        let off = (id * WAY_RECORD_BYTES) as usize;
        let buf = &mut self.region.as_mut_slice()[off..off + WAY_RECORD_BYTES as usize];
        LittleEndian::write_u32(&mut buf[0..4], first_ref_index);
        LittleEndian::write_u32(&mut buf[4..8], tags_offset);
        Ok(())
    }

    pub fn get(&self, id: u64) -> Result<(u32, u32)> {
        self.check_id(id)?;
        let off = (id * WAY_RECORD_BYTES) as usize;
        let buf = &self.region.as_slice()[off..off + WAY_RECORD_BYTES as usize];
        let first_ref_index = LittleEndian::read_u32(&buf[0..4]);
        let tags_offset = LittleEndian::read_u32(&buf[4..8]);
        Ok((first_ref_index, tags_offset))
    }
}

/// The single contiguous array of delta-resolved, sign-terminated member
/// node references shared by all ways.
pub struct NodeRefStore {
    region: SparseRegion,
    max_refs: u64,
    len: u64,
}

impl NodeRefStore {
    pub fn open(backing: &Backing, max_refs: u64) -> Result<Self> {
        let region = backing.region("node_refs", max_refs * NODE_REF_BYTES)?;
        Ok(NodeRefStore {
            region,
            max_refs,
            len: 0,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends one entry, returning its index.
    pub fn push(&mut self, value: i64) -> Result<u64> {
        if self.len >= self.max_refs {
            return Err(VexError::NodeRefCapacityExceeded { cursor: self.len });
        }
        let off = (self.len * NODE_REF_BYTES) as usize;
        LittleEndian::write_i64(
            &mut self.region.as_mut_slice()[off..off + NODE_REF_BYTES as usize],
            value,
        );
        let idx = self.len;
        self.len += 1;
        Ok(idx)
    }

    pub fn get(&self, index: u64) -> i64 {
        let off = (index * NODE_REF_BYTES) as usize;
        LittleEndian::read_i64(&self.region.as_slice()[off..off + NODE_REF_BYTES as usize])
    }

    /// Negates the entry at `index` in place; used to mark the final
    /// member-node reference of a way's list.
    pub fn negate(&mut self, index: u64) {
        let v = self.get(index);
        let off = (index * NODE_REF_BYTES) as usize;
        LittleEndian::write_i64(
            &mut self.region.as_mut_slice()[off..off + NODE_REF_BYTES as usize],
            -v,
        );
    }

    /// Returns a way's member-node IDs (absolute, positive) starting at
    /// `first_ref_index`, reading up to and including the negated
    /// terminator entry.
    pub fn way_refs(&self, first_ref_index: u32) -> Vec<i64> {
        let mut out = Vec::new();
        let mut idx = first_ref_index as u64;
        loop {
            let v = self.get(idx);
            if v < 0 {
                out.push(-v);
                break;
            }
            out.push(v);
            idx += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut store = NodeStore::open(&backing, 1000).unwrap();
        let coord = Coord::from_degrees(45.0, 45.0).unwrap();
        store.set(5, coord, 42).unwrap();
        let (got_coord, got_offset) = store.get(5).unwrap();
        assert_eq!(got_coord, coord);
        assert_eq!(got_offset, 42);
    }

    #[test]
    fn node_store_rejects_out_of_bounds_id() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut store = NodeStore::open(&backing, 10).unwrap();
        let coord = Coord::from_degrees(0.0, 0.0).unwrap();
        assert!(store.set(10, coord, 0).is_err());
    }

    #[test]
    fn node_ref_store_push_and_negate() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut refs = NodeRefStore::open(&backing, 100).unwrap();
        let i0 = refs.push(5).unwrap();
        let i1 = refs.push(7).unwrap();
        let i2 = refs.push(4).unwrap();
        let i3 = refs.push(14).unwrap();
        refs.negate(i3);
        assert_eq!(refs.get(i0), 5);
        assert_eq!(refs.get(i1), 7);
        assert_eq!(refs.get(i2), 4);
        assert_eq!(refs.get(i3), -14);
    }
}
