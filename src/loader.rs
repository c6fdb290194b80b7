//! Drives the PBF parser's node/way stream into the backing stores,
//! enforcing the load protocol's strict ordering contract: every node
//! must arrive before any way.

use std::path::Path;

use osmpbf::{Element, ElementReader};
use tracing::info;

use crate::coord::Coord;
use crate::database::Database;
use crate::error::{Result, VexError};
use crate::tags::EntityType;

pub fn load(db: &mut Database, input_path: &Path) -> Result<()> {
    let reader = ElementReader::from_path(input_path).map_err(|e| {
        VexError::io(
            input_path,
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    })?;

    let mut first_error: Option<VexError> = None;

    reader
        .for_each(|element| {
            if first_error.is_some() {
                return;
            }
            let outcome = match element {
                Element::Node(node) => handle_node(
                    db,
                    node.id() as u64,
                    node.lat(),
                    node.lon(),
                    node.tags()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                Element::DenseNode(node) => handle_node(
                    db,
                    node.id() as u64,
                    node.lat(),
                    node.lon(),
                    node.tags()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                Element::Way(way) => handle_way(
                    db,
                    way.id() as u64,
                    way.refs().collect(),
                    way.tags()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                // Relations are out of scope for storage; dropped silently.
                Element::Relation(_) => Ok(()),
            };
            if let Err(e) = outcome {
                first_error = Some(e);
            }
        })
        .map_err(|e| {
            VexError::io(
                input_path,
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })?;

    if let Some(e) = first_error {
        return Err(e);
    }

    info!(
        nodes = db.nodes_loaded,
        ways = db.ways_loaded,
        way_blocks = db.grid.way_block_count(),
        "load complete"
    );
    Ok(())
}

fn handle_node(db: &mut Database, id: u64, lat: f64, lon: f64, tags: Vec<(String, String)>) -> Result<()> {
    if db.ways_loaded != 0 {
        return Err(VexError::NodeAfterWay { id });
    }
    if id >= db.config.capacity.max_node_id {
        return Err(VexError::NodeIdOutOfBounds { id });
    }
    let coord = Coord::from_degrees(lat, lon)?;
    let tags_offset = db.tags.write_tags(id, EntityType::Node, &tags)?;
    db.nodes.set(id, coord, tags_offset)?;
    db.nodes_loaded += 1;
    if db.nodes_loaded % 1_000_000 == 0 {
        info!(nodes_loaded = db.nodes_loaded, "progress");
    }
    Ok(())
}

fn handle_way(db: &mut Database, id: u64, refs: Vec<i64>, tags: Vec<(String, String)>) -> Result<()> {
    if db.nodes_loaded == 0 {
        return Err(VexError::WayBeforeNode { id });
    }
    if id >= db.config.capacity.max_way_id {
        return Err(VexError::WayIdOutOfBounds { id });
    }
    if refs.is_empty() {
        return Ok(());
    }

    let first_ref_index = db.node_refs.len() as u32;
    let mut last_index = 0u64;
    for &r in &refs {
        last_index = db.node_refs.push(r)?;
    }
    db.node_refs.negate(last_index);

    let first_node_id = refs[0] as u64;
    let (first_coord, _) = db.nodes.get(first_node_id)?;

    let tags_offset = db.tags.write_tags(id, EntityType::Way, &tags)?;
    db.ways.set(id, first_ref_index, tags_offset)?;
    db.grid.insert_way(first_coord, id as i32)?;

    db.ways_loaded += 1;
    if db.ways_loaded % 1_000_000 == 0 {
        info!(ways_loaded = db.ways_loaded, "progress");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::region::Backing;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let backing = Backing::Dir(dir.path().to_path_buf());
        let mut config = Config::default();
        config.capacity.max_node_id = 1000;
        config.capacity.max_way_id = 1000;
        config.capacity.max_node_refs = 1000;
        let db = Database::open(backing, config).unwrap();
        (dir, db)
    }

    #[test]
    fn way_before_any_node_is_rejected() {
        let (_dir, mut db) = open_db();
        let err = handle_way(&mut db, 1, vec![1, 2], vec![]);
        assert!(matches!(err, Err(VexError::WayBeforeNode { id: 1 })));
    }

    #[test]
    fn node_after_way_is_rejected() {
        let (_dir, mut db) = open_db();
        handle_node(&mut db, 1, 45.0, 45.0, vec![]).unwrap();
        handle_way(&mut db, 1, vec![1], vec![]).unwrap();
        let err = handle_node(&mut db, 2, 45.0, 45.0, vec![]);
        assert!(matches!(err, Err(VexError::NodeAfterWay { id: 2 })));
    }

    #[test]
    fn way_refs_are_stored_with_negated_terminator() {
        let (_dir, mut db) = open_db();
        handle_node(&mut db, 1, 45.0, 45.0, vec![]).unwrap();
        handle_node(&mut db, 2, 45.01, 45.0, vec![]).unwrap();
        handle_node(&mut db, 3, 45.01, 45.01, vec![]).unwrap();
        handle_way(&mut db, 10, vec![1, 2, 3], vec![]).unwrap();
        let (first_ref_index, _) = db.ways.get(10).unwrap();
        let refs = db.node_refs.way_refs(first_ref_index);
        assert_eq!(refs, vec![1, 2, 3]);
    }
}
