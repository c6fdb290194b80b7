//! Minimal `.osm.pbf` emitter.
//!
//! `osmpbf` (the parser dependency) only reads; querying needs to write
//! results back out, so this module hand-rolls the small slice of the
//! OSM PBF / fileformat protobuf schemas actually needed: a header
//! block, dense nodes, and ways, each wrapped in a zlib-compressed blob.
//! Field numbers and wire types below follow the public `fileformat.proto`
//! / `osmformat.proto` schemas.

use std::collections::HashMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Result, VexError};

/// Accumulates nodes and ways in memory and flushes them as PBF blobs on
/// `finish`. Mirrors the two-stage NODE-then-WAY query protocol: nodes
/// queued by `write_node` and ways by `write_way` are each flushed as
/// their own `PrimitiveBlock` when `flush_stage` is called.
pub struct PbfWriter {
    out: std::fs::File,
    pending_nodes: Vec<(i64, f64, f64, Vec<(String, String)>)>,
    pending_ways: Vec<(i64, Vec<i64>, Vec<(String, String)>)>,
    wrote_header: bool,
}

impl PbfWriter {
    pub fn create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let out = std::fs::File::create(path.as_ref())
            .map_err(|e| VexError::io(path.as_ref(), e))?;
        Ok(PbfWriter {
            out,
            pending_nodes: Vec::new(),
            pending_ways: Vec::new(),
            wrote_header: false,
        })
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.wrote_header {
            return Ok(());
        }
        let mut header = Vec::new();
        write_string_field(&mut header, 16, "vex");
        self.write_blob(b"OSMHeader", &header)?;
        self.wrote_header = true;
        Ok(())
    }

    pub fn write_node(&mut self, id: i64, lat: f64, lon: f64, tags: Vec<(String, String)>) {
        self.pending_nodes.push((id, lat, lon, tags));
    }

    pub fn write_way(&mut self, id: i64, refs: Vec<i64>, tags: Vec<(String, String)>) {
        self.pending_ways.push((id, refs, tags));
    }

    /// Flushes whatever nodes/ways have been queued since the last flush
    /// as one `PrimitiveBlock`, then clears the queues.
    pub fn flush_stage(&mut self) -> Result<()> {
        self.ensure_header()?;
        if self.pending_nodes.is_empty() && self.pending_ways.is_empty() {
            return Ok(());
        }
        let block = build_primitive_block(&self.pending_nodes, &self.pending_ways);
        self.write_blob(b"OSMData", &block)?;
        self.pending_nodes.clear();
        self.pending_ways.clear();
        Ok(())
    }

    fn write_blob(&mut self, blob_type: &[u8], raw: &[u8]) -> Result<()> {
        let mut zlib_data = Vec::new();
        {
            let mut enc = ZlibEncoder::new(&mut zlib_data, Compression::default());
            enc.write_all(raw)
                .map_err(|e| VexError::io("<pbf output>", e))?;
            enc.finish().map_err(|e| VexError::io("<pbf output>", e))?;
        }

        let mut blob = Vec::new();
        write_varint_field(&mut blob, 2, raw.len() as u64);
        write_bytes_field(&mut blob, 3, &zlib_data);

        let mut blob_header = Vec::new();
        write_string_field_bytes(&mut blob_header, 1, blob_type);
        write_varint_field(&mut blob_header, 3, blob.len() as u64);

        self.out
            .write_all(&(blob_header.len() as u32).to_be_bytes())
            .map_err(|e| VexError::io("<pbf output>", e))?;
        self.out
            .write_all(&blob_header)
            .map_err(|e| VexError::io("<pbf output>", e))?;
        self.out
            .write_all(&blob)
            .map_err(|e| VexError::io("<pbf output>", e))?;
        Ok(())
    }
}

fn build_primitive_block(
    nodes: &[(i64, f64, f64, Vec<(String, String)>)],
    ways: &[(i64, Vec<i64>, Vec<(String, String)>)],
) -> Vec<u8> {
    let mut strings: Vec<String> = vec![String::new()]; // index 0 is reserved
    let mut index: HashMap<String, u32> = HashMap::new();
    index.insert(String::new(), 0);
    let mut intern = |s: &str| -> u32 {
        if let Some(&i) = index.get(s) {
            return i;
        }
        let i = strings.len() as u32;
        strings.push(s.to_string());
        index.insert(s.to_string(), i);
        i
    };

    let mut group = Vec::new();
    if !nodes.is_empty() {
        let mut dense = Vec::new();
        let mut ids = Vec::new();
        let mut lats = Vec::new();
        let mut lons = Vec::new();
        let mut prev_id = 0i64;
        let mut prev_lat = 0i64;
        let mut prev_lon = 0i64;
        let mut keys_vals = Vec::new();
        for (id, lat, lon, tags) in nodes {
            ids.push(zigzag(*id - prev_id));
            prev_id = *id;
            let lat_unit = (*lat * 1e7).round() as i64;
            let lon_unit = (*lon * 1e7).round() as i64;
            lats.push(zigzag(lat_unit - prev_lat));
            lons.push(zigzag(lon_unit - prev_lon));
            prev_lat = lat_unit;
            prev_lon = lon_unit;
            for (k, v) in tags {
                keys_vals.push(intern(k) as i64);
                keys_vals.push(intern(v) as i64);
            }
            keys_vals.push(0);
        }
        write_packed_varint(&mut dense, 1, &ids);
        write_packed_varint(&mut dense, 8, &lats);
        write_packed_varint(&mut dense, 9, &lons);
        write_packed_varint_unsigned(&mut dense, 10, &keys_vals);
        write_bytes_field(&mut group, 2, &dense);
    }
    for (id, refs, tags) in ways {
        let mut way = Vec::new();
        write_varint_field(&mut way, 1, as_varint_u64(*id));
        let keys: Vec<i64> = tags.iter().map(|(k, _)| intern(k) as i64).collect();
        let vals: Vec<i64> = tags.iter().map(|(_, v)| intern(v) as i64).collect();
        write_packed_varint_unsigned(&mut way, 2, &keys);
        write_packed_varint_unsigned(&mut way, 3, &vals);
        let mut deltas = Vec::new();
        let mut prev = 0i64;
        for r in refs {
            deltas.push(zigzag(*r - prev));
            prev = *r;
        }
        write_packed_varint(&mut way, 8, &deltas);
        write_bytes_field(&mut group, 3, &way);
    }

    let mut stringtable = Vec::new();
    for s in &strings {
        write_bytes_field(&mut stringtable, 1, s.as_bytes());
    }

    let mut block = Vec::new();
    write_bytes_field(&mut block, 1, &stringtable);
    write_bytes_field(&mut block, 2, &group);
    write_varint_field(&mut block, 17, 100); // granularity
    block
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// Plain (non-zigzag) varint encoding of a signed value via two's
/// complement reinterpretation, for fields declared `int64`/`required`.
fn as_varint_u64(v: i64) -> u64 {
    v as u64
}

fn write_varint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if v == 0 {
            break;
        }
    }
}

fn write_tag(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    write_varint(buf, ((field as u64) << 3) | wire_type as u64);
}

fn write_varint_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    write_tag(buf, field, 0);
    write_varint(buf, value);
}

fn write_bytes_field(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    write_tag(buf, field, 2);
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn write_string_field(buf: &mut Vec<u8>, field: u32, s: &str) {
    write_bytes_field(buf, field, s.as_bytes());
}

fn write_string_field_bytes(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    write_bytes_field(buf, field, bytes);
}

fn write_packed_varint(buf: &mut Vec<u8>, field: u32, values: &[u64]) {
    let mut payload = Vec::new();
    for &v in values {
        write_varint(&mut payload, v);
    }
    write_bytes_field(buf, field, &payload);
}

fn write_packed_varint_unsigned(buf: &mut Vec<u8>, field: u32, values: &[i64]) {
    let mut payload = Vec::new();
    for &v in values {
        write_varint(&mut payload, v as u64);
    }
    write_bytes_field(buf, field, &payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_valid_blob_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pbf");
        let mut writer = PbfWriter::create(&path).unwrap();
        writer.write_node(1, 45.0, 45.0, vec![("name".to_string(), "A".to_string())]);
        writer.flush_stage().unwrap();
        writer.write_way(10, vec![1], vec![("highway".to_string(), "residential".to_string())]);
        writer.flush_stage().unwrap();
        drop(writer);
        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.is_empty());
        // first 4 bytes are the big-endian BlobHeader length of the
        // OSMHeader blob.
        let header_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        assert!(header_len > 0 && (header_len as usize) < bytes.len());
    }

    #[test]
    fn zigzag_round_trips() {
        for v in [-5i64, -1, 0, 1, 5, i32::MAX as i64, i32::MIN as i64] {
            let z = zigzag(v);
            let decoded = ((z >> 1) as i64) ^ -((z & 1) as i64);
            assert_eq!(decoded, v);
        }
    }
}
