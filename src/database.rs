//! The owned aggregate replacing the original engine's process-wide
//! global state: one `Database` value holds every backing store and is
//! threaded through the loader and query paths by the caller.

use crate::config::Config;
use crate::error::Result;
use crate::grid::{FillFactor, Grid};
use crate::region::Backing;
use crate::storage::{NodeRefStore, NodeStore, WayStore};
use crate::tags::TagStream;

pub struct Database {
    pub nodes: NodeStore,
    pub ways: WayStore,
    pub node_refs: NodeRefStore,
    pub grid: Grid,
    pub tags: TagStream,
    pub config: Config,
    pub nodes_loaded: u64,
    pub ways_loaded: u64,
}

const MAX_WAY_BLOCKS_DIVISOR: u64 = 5;

impl Database {
    pub fn open(backing: Backing, config: Config) -> Result<Self> {
        let max_way_blocks =
            (crate::coord::GRID_DIM as u64 * crate::coord::GRID_DIM as u64) / MAX_WAY_BLOCKS_DIVISOR;
        let nodes = NodeStore::open(&backing, config.capacity.max_node_id)?;
        let ways = WayStore::open(&backing, config.capacity.max_way_id)?;
        let node_refs = NodeRefStore::open(&backing, config.capacity.max_node_refs)?;
        let grid = Grid::open(&backing, max_way_blocks)?;
        let tags = TagStream::new(backing);
        Ok(Database {
            nodes,
            ways,
            node_refs,
            grid,
            tags,
            config,
            nodes_loaded: 0,
            ways_loaded: 0,
        })
    }

    pub fn fill_factor(&self) -> FillFactor {
        self.grid.fill_factor()
    }
}
