//! Fixed-size 2D spatial grid mapping bins to way-block chains.

use byteorder::{ByteOrder, LittleEndian};

use crate::coord::{Coord, GRID_DIM};
use crate::error::Result;
use crate::region::{Backing, SparseRegion};
use crate::wayblock::WayBlockStore;

pub struct Grid {
    cells: SparseRegion,
    blocks: WayBlockStore,
}

pub struct FillFactor {
    pub used_cells: u64,
    pub total_cells: u64,
}

impl FillFactor {
    pub fn percent(&self) -> f64 {
        if self.total_cells == 0 {
            0.0
        } else {
            100.0 * self.used_cells as f64 / self.total_cells as f64
        }
    }
}

impl Grid {
    pub fn open(backing: &Backing, max_way_blocks: u64) -> Result<Self> {
        let cell_count = (GRID_DIM as u64) * (GRID_DIM as u64);
        let cells = backing.region("grid", cell_count * 4)?;
        let blocks = WayBlockStore::open(backing, max_way_blocks)?;
        Ok(Grid { cells, blocks })
    }

    fn cell_index(xb: u32, yb: u32) -> usize {
        xb as usize * GRID_DIM as usize + yb as usize
    }

    fn head(&self, xb: u32, yb: u32) -> u32 {
        let off = Self::cell_index(xb, yb) * 4;
        LittleEndian::read_u32(&self.cells.as_slice()[off..off + 4])
    }

    fn set_head(&mut self, xb: u32, yb: u32, head: u32) {
        let off = Self::cell_index(xb, yb) * 4;
        LittleEndian::write_u32(&mut self.cells.as_mut_slice()[off..off + 4], head);
    }

    /// Inserts `way_id` into the cell containing `first_node_coord`.
    pub fn insert_way(&mut self, first_node_coord: Coord, way_id: i32) -> Result<()> {
        let (xb, yb) = first_node_coord.bin();
        let mut head = self.head(xb, yb);
        self.blocks.insert(&mut head, way_id)?;
        self.set_head(xb, yb, head);
        Ok(())
    }

    /// Invokes `callback` with each way ID stored in cell `(xb, yb)`.
    pub fn enumerate_cell(&self, xb: u32, yb: u32, callback: impl FnMut(i32)) {
        let head = self.head(xb, yb);
        self.blocks.enumerate(head, callback);
    }

    pub fn fill_factor(&self) -> FillFactor {
        let mut used = 0u64;
        let total = (GRID_DIM as u64) * (GRID_DIM as u64);
        let bytes = self.cells.as_slice();
        for off in (0..bytes.len()).step_by(4) {
            if LittleEndian::read_u32(&bytes[off..off + 4]) != 0 {
                used += 1;
            }
        }
        FillFactor {
            used_cells: used,
            total_cells: total,
        }
    }

    pub fn way_block_count(&self) -> u64 {
        self.blocks.block_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_enumerate_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut grid = Grid::open(&backing, 1024).unwrap();
        let coord = Coord::from_degrees(0.0, 0.0).unwrap();
        for way_id in 1..=33 {
            grid.insert_way(coord, way_id).unwrap();
        }
        let (xb, yb) = coord.bin();
        let mut seen = Vec::new();
        grid.enumerate_cell(xb, yb, |w| seen.push(w));
        assert_eq!(seen.len(), 33);
    }

    #[test]
    fn empty_cell_enumerates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let grid = Grid::open(&backing, 1024).unwrap();
        let mut seen = Vec::new();
        grid.enumerate_cell(0, 0, |w| seen.push(w));
        assert!(seen.is_empty());
    }
}
