//! Client-side position-map/stash checkpointing (§6).
//!
//! Format: `magic | version | shard_count | for each shard: (height, z,
//! payload_len, position map entries, stash entries)`, every record
//! length-prefixed the same way as the wire protocol so one framing
//! routine serves both.

use crate::error::OramError;
use crate::path_oram::{LeafLabel, PathOram};
use crate::shard::AdjustableShardSet;
use crate::transport::{read_frame, write_frame};
use crate::Address;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const MAGIC: u32 = 0x504F_434B; // "POCK"
const VERSION: u8 = 0x01;

/// Writes every shard's position map and stash to `path` in one atomic
/// file (write to a temp file, then rename, so a crash mid-write never
/// corrupts the previous checkpoint).
pub fn save_checkpoint(path: &Path, shards: &AdjustableShardSet) -> Result<(), OramError> {
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all_tag(MAGIC, VERSION)?;
        write_frame(&mut writer, &(shards.shard_count() as u32).to_be_bytes())?;
        for oram in shards.shards() {
            write_shard(&mut writer, oram)?;
        }
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Restores every shard's position map and stash from a file written by
/// [`save_checkpoint`]. `shards` must already be constructed with matching
/// `(height, z, payload_len)` parameters; only the map/stash contents are
/// replaced.
pub fn load_checkpoint(path: &Path, shards: &mut AdjustableShardSet) -> Result<(), OramError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    reader.read_and_check_tag(MAGIC, VERSION)?;
    let shard_count = u32::from_be_bytes(read_frame(&mut reader)?.try_into().unwrap()) as usize;
    if shard_count != shards.shard_count() {
        return Err(OramError::Config(format!(
            "checkpoint has {shard_count} shards, configuration expects {}",
            shards.shard_count()
        )));
    }
    for oram in shards.shards_mut() {
        load_shard(&mut reader, oram)?;
    }
    Ok(())
}

fn write_shard<W: std::io::Write>(writer: &mut W, oram: &PathOram) -> Result<(), OramError> {
    write_frame(writer, &oram.height().to_be_bytes())?;
    write_frame(writer, &(oram.position_map_len() as u32).to_be_bytes())?;
    for (addr, leaf) in oram.position_map_entries() {
        let mut record = Vec::with_capacity(12);
        record.extend_from_slice(&addr.to_be_bytes());
        record.extend_from_slice(&(leaf as u32).to_be_bytes());
        write_frame(writer, &record)?;
    }
    let stash_blocks = oram.stash_blocks();
    write_frame(writer, &(stash_blocks.len() as u32).to_be_bytes())?;
    for block in stash_blocks {
        write_frame(writer, &block.to_bytes(oram.payload_len()))?;
    }
    Ok(())
}

fn load_shard<R: std::io::Read>(reader: &mut R, oram: &mut PathOram) -> Result<(), OramError> {
    let height = u32::from_be_bytes(read_frame(reader)?.try_into().unwrap());
    if height != oram.height() {
        return Err(OramError::Config(format!(
            "checkpoint shard has height {height}, expected {}",
            oram.height()
        )));
    }
    let entry_count = u32::from_be_bytes(read_frame(reader)?.try_into().unwrap());
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let record = read_frame(reader)?;
        if record.len() != 12 {
            return Err(OramError::Protocol("malformed position map record".into()));
        }
        let addr = Address::from_be_bytes(record[0..8].try_into().unwrap());
        let leaf = u32::from_be_bytes(record[8..12].try_into().unwrap()) as LeafLabel;
        entries.push((addr, leaf));
    }

    let block_count = u32::from_be_bytes(read_frame(reader)?.try_into().unwrap());
    let payload_len = oram.payload_len();
    let mut blocks = Vec::with_capacity(block_count as usize);
    for _ in 0..block_count {
        let record = read_frame(reader)?;
        blocks.push(crate::block::Block::from_bytes(&record, payload_len)?);
    }

    oram.restore_checkpoint(entries, blocks)
}

trait WritePreamble {
    fn write_all_tag(&mut self, magic: u32, version: u8) -> Result<(), OramError>;
}

impl<W: std::io::Write> WritePreamble for W {
    fn write_all_tag(&mut self, magic: u32, version: u8) -> Result<(), OramError> {
        self.write_all(&magic.to_be_bytes())?;
        self.write_all(&[version])?;
        Ok(())
    }
}

trait ReadPreamble {
    fn read_and_check_tag(&mut self, magic: u32, version: u8) -> Result<(), OramError>;
}

impl<R: std::io::Read> ReadPreamble for R {
    fn read_and_check_tag(&mut self, magic: u32, version: u8) -> Result<(), OramError> {
        let mut magic_bytes = [0u8; 4];
        self.read_exact(&mut magic_bytes)?;
        if u32::from_be_bytes(magic_bytes) != magic {
            return Err(OramError::Protocol("bad checkpoint magic".into()));
        }
        let mut version_byte = [0u8; 1];
        self.read_exact(&mut version_byte)?;
        if version_byte[0] != version {
            return Err(OramError::Protocol(format!(
                "unsupported checkpoint version {:#x}",
                version_byte[0]
            )));
        }
        Ok(())
    }
}
