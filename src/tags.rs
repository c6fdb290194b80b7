//! Dictionary-compressed tag stream, sharded across up to 32 sub-files.
//!
//! Each sub-file is a 4 GiB sparse region. An entity's tag list lives in
//! sub-file `S(id, type)` at the offset returned by `write_tags`; offset
//! 0 is reserved in every sub-file to mean "no tags" and always holds a
//! lone terminator byte.

use crate::error::{Result, VexError};
use crate::region::{Backing, SparseRegion};
use crate::tagcodec::{self, Code};

pub const MAX_SUBFILES: usize = 32;
pub const SUBFILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;
pub const TERMINATOR: u8 = 0x7F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Node,
    Way,
    Relation,
}

/// `S(id, type)`: maps an entity ID to a sub-file index in `[0, 32)`.
pub fn subfile_index(id: u64, kind: EntityType) -> Result<usize> {
    let shifted = match kind {
        EntityType::Node => (id / 16) >> 25,
        EntityType::Way => id >> 25,
        EntityType::Relation => (id * 64) >> 25,
    };
    if shifted >= MAX_SUBFILES as u64 {
        return Err(VexError::TagSubfileOutOfBounds { index: shifted });
    }
    Ok(shifted as usize)
}

struct Subfile {
    region: SparseRegion,
    pos: u32,
}

pub struct TagStream {
    backing: Backing,
    subfiles: [Option<Subfile>; MAX_SUBFILES],
}

impl TagStream {
    pub fn new(backing: Backing) -> Self {
        TagStream {
            backing,
            subfiles: std::array::from_fn(|_| None),
        }
    }

    fn ensure_subfile(&mut self, idx: usize) -> Result<&mut Subfile> {
        if self.subfiles[idx].is_none() {
            let mut region = self.backing.region(&format!("tags.{idx:03}"), SUBFILE_SIZE)?;
            // offset 0 is the reserved "no tags" sentinel.
            if region.as_slice()[0] == 0 {
                region.as_mut_slice()[0] = TERMINATOR;
            }
            self.subfiles[idx] = Some(Subfile { region, pos: 1 });
        }
        Ok(self.subfiles[idx].as_mut().unwrap())
    }

    /// Writes the tag list for entity `id` of type `kind`. Returns the
    /// starting byte offset within its sub-file, or 0 if every pair was
    /// skipped (or the list was empty to begin with).
    pub fn write_tags(&mut self, id: u64, kind: EntityType, tags: &[(String, String)]) -> Result<u32> {
        if tags.is_empty() {
            return Ok(0);
        }
        let idx = subfile_index(id, kind)?;
        let subfile = self.ensure_subfile(idx)?;
        let start = subfile.pos;
        let mut cursor = start as usize;
        let mut wrote_any = false;

        for (key, val) in tags {
            if tagcodec::should_skip(key) {
                continue;
            }
            wrote_any = true;
            let buf = subfile.region.as_mut_slice();
            match tagcodec::encode(key, val) {
                Code::Full(code) => {
                    cursor = put_byte(buf, cursor, code as u8)?;
                }
                Code::KeyOnly(code) => {
                    cursor = put_byte(buf, cursor, code as u8)?;
                    cursor = put_cstr(buf, cursor, val.as_bytes())?;
                }
                Code::None => {
                    cursor = put_byte(buf, cursor, 0)?;
                    cursor = put_cstr(buf, cursor, key.as_bytes())?;
                    cursor = put_cstr(buf, cursor, val.as_bytes())?;
                }
            }
        }

        if !wrote_any {
            return Ok(0);
        }

        cursor = put_byte(subfile.region.as_mut_slice(), cursor, TERMINATOR)?;
        if cursor as u64 > u32::MAX as u64 {
            return Err(VexError::TagOffsetOverflow { id });
        }
        subfile.pos = cursor as u32;
        Ok(start)
    }

    /// Reads back the decoded key/value pairs starting at `offset` within
    /// the sub-file for `(id, kind)`. Offset 0 always decodes to an empty
    /// list.
    pub fn read_tags(&mut self, id: u64, kind: EntityType, offset: u32) -> Result<Vec<(String, String)>> {
        if offset == 0 {
            return Ok(Vec::new());
        }
        let idx = subfile_index(id, kind)?;
        let subfile = self.ensure_subfile(idx)?;
        let buf = subfile.region.as_slice();
        let mut cursor = offset as usize;
        let mut out = Vec::new();
        loop {
            let code = buf[cursor] as i8;
            cursor += 1;
            if code as u8 == TERMINATOR {
                break;
            }
            if code > 0 {
                if let Some((key, val)) = tagcodec::decode_full(code) {
                    out.push((key.to_string(), val.to_string()));
                }
            } else if code < 0 {
                let key = tagcodec::decode_key(code).unwrap_or("").to_string();
                let (val, next) = read_cstr(buf, cursor);
                cursor = next;
                out.push((key, val));
            } else {
                let (key, next) = read_cstr(buf, cursor);
                cursor = next;
                let (val, next) = read_cstr(buf, cursor);
                cursor = next;
                out.push((key, val));
            }
        }
        Ok(out)
    }
}

fn put_byte(buf: &mut [u8], cursor: usize, byte: u8) -> Result<usize> {
    buf[cursor] = byte;
    Ok(cursor + 1)
}

fn put_cstr(buf: &mut [u8], cursor: usize, bytes: &[u8]) -> Result<usize> {
    buf[cursor..cursor + bytes.len()].copy_from_slice(bytes);
    let end = cursor + bytes.len();
    buf[end] = 0;
    Ok(end + 1)
}

fn read_cstr(buf: &[u8], start: usize) -> (String, usize) {
    let mut end = start;
    while buf[end] != 0 {
        end += 1;
    }
    (String::from_utf8_lossy(&buf[start..end]).into_owned(), end + 1)
}
