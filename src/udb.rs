//! Universal Database (spec §4.D): a single memory-mapped file shared by
//! every process that touches a zone's RR data, backing the task ring
//! (§4.I) and the reload snapshot handoff (§4.K).
//!
//! Grounded on heimdall's persistence layer style (`cache.rs`'s
//! `bincode`-framed on-disk records plus a `crc32fast` checksum on
//! load/save) generalized from a flat cache file to the power-of-two
//! chunk arena with a relocatable-pointer allocator spec §4.D describes.
//! `memmap2` replaces heimdall's whole-file read/write since every
//! server and xfrd process needs to observe writes made by others
//! without a round trip through the filesystem.

use crate::error::{NsdError, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::Path;

pub const MAGIC: [u8; 8] = *b"WYRDNUDB";
pub const FORMAT_VERSION: u32 = 1;

/// Size classes run from 2^MIN_EXP to 2^MAX_EXP bytes; anything larger
/// is an "XL" chunk carrying an explicit size (spec §4.D "Chunks carry
/// an exponent byte... Oversized chunks (exponent = XL) carry an
/// explicit size").
const MIN_EXP: u8 = 5; // 32 bytes
const MAX_EXP: u8 = 20; // 1 MiB
const XL_EXP: u8 = 255;
const NUM_CLASSES: usize = (MAX_EXP - MIN_EXP + 1) as usize;

/// Fixed file header, checksummed as a whole (spec §4.D "fixed header
/// (magic, format version, clean-shutdown flag, file size, rollback
/// bounds, header checksum)").
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Header {
    magic: [u8; 8],
    format_version: u32,
    clean_shutdown: u32,
    file_size: u64,
    /// Rollback window (supplemented from `udb.h`/`db.c`): the byte range
    /// `[rb_old, rb_old + rb_size)` holds the pre-write image of
    /// `[rb_new, rb_new + rb_size)` within segment `rb_seg`, so a crash
    /// mid-write can be undone on next open.
    rb_old: u64,
    rb_new: u64,
    rb_size: u64,
    rb_seg: u64,
    free_list_heads: [u64; NUM_CLASSES],
    checksum: u32,
}

const HEADER_LEN: usize = std::mem::size_of::<Header>();

impl Header {
    fn new(file_size: u64) -> Self {
        Header {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            clean_shutdown: 1,
            file_size,
            rb_old: 0,
            rb_new: 0,
            rb_size: 0,
            rb_seg: 0,
            free_list_heads: [0; NUM_CLASSES],
            checksum: 0,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&self.magic);
        buf.extend_from_slice(&self.format_version.to_le_bytes());
        buf.extend_from_slice(&self.clean_shutdown.to_le_bytes());
        buf.extend_from_slice(&self.file_size.to_le_bytes());
        buf.extend_from_slice(&self.rb_old.to_le_bytes());
        buf.extend_from_slice(&self.rb_new.to_le_bytes());
        buf.extend_from_slice(&self.rb_size.to_le_bytes());
        buf.extend_from_slice(&self.rb_seg.to_le_bytes());
        for head in &self.free_list_heads {
            buf.extend_from_slice(&head.to_le_bytes());
        }
        let checksum = crc32fast::hash(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(NsdError::UdbCorrupt("header truncated".into()));
        }
        let checksummed_len = HEADER_LEN - 4;
        let expected = crc32fast::hash(&bytes[..checksummed_len]);
        let actual = u32::from_le_bytes(bytes[checksummed_len..HEADER_LEN].try_into().unwrap());
        if expected != actual {
            return Err(NsdError::UdbCorrupt("header checksum mismatch".into()));
        }
        let magic: [u8; 8] = bytes[0..8].try_into().unwrap();
        if magic != MAGIC {
            return Err(NsdError::UdbCorrupt("bad magic".into()));
        }
        let mut free_list_heads = [0u64; NUM_CLASSES];
        let mut pos = 56;
        for head in &mut free_list_heads {
            *head = u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
            pos += 8;
        }
        Ok(Header {
            magic,
            format_version: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            clean_shutdown: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            file_size: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            rb_old: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
            rb_new: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            rb_size: u64::from_le_bytes(bytes[40..48].try_into().unwrap()),
            rb_seg: u64::from_le_bytes(bytes[48..56].try_into().unwrap()),
            free_list_heads,
        })
    }
}

/// A file offset into the mapped region; `0` is reserved as a null
/// pointer, matching spec §4.D's `rel_ptr` ("file-offset pointers
/// enrolled in the destination chunk's pointer list").
pub type RelPtr = u64;

fn exp_for(size: usize) -> u8 {
    let mut exp = MIN_EXP;
    while (1usize << exp) < size && exp < MAX_EXP {
        exp += 1;
    }
    if (1usize << exp) < size {
        XL_EXP
    } else {
        exp
    }
}

/// A memory-mapped chunk arena. Held open by every process sharing the
/// zone database; `open` maps the file, validates or rebuilds the
/// header, and rolls back an interrupted write if `clean_shutdown` was
/// `0` on open.
pub struct Udb {
    mmap: MmapMut,
}

impl Udb {
    pub fn open(path: &Path) -> Result<Self> {
        let initial_size = 4096u64;
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        if file.metadata()?.len() < initial_size {
            file.set_len(initial_size)?;
        }
        let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        let needs_init = &mmap[0..8] != MAGIC;
        if needs_init {
            let header = Header::new(initial_size);
            mmap[0..HEADER_LEN].copy_from_slice(&header.encode());
        } else {
            let header = Header::decode(&mmap[0..HEADER_LEN])?;
            if header.clean_shutdown == 0 {
                Self::rollback(&mut mmap, &header);
            }
        }

        let mut udb = Udb { mmap };
        udb.set_clean_shutdown(false)?;
        Ok(udb)
    }

    /// Undo a partial overwrite recorded by the rollback window (spec
    /// §4.D): copy the pre-image at `rb_old` back over `rb_new`.
    fn rollback(mmap: &mut MmapMut, header: &Header) {
        if header.rb_size == 0 {
            return;
        }
        let (old, new, size) = (header.rb_old as usize, header.rb_new as usize, header.rb_size as usize);
        if old + size <= mmap.len() && new + size <= mmap.len() {
            let preimage = mmap[old..old + size].to_vec();
            mmap[new..new + size].copy_from_slice(&preimage);
        }
    }

    fn header(&self) -> Header {
        Header::decode(&self.mmap[0..HEADER_LEN]).expect("header already validated at open")
    }

    fn write_header(&mut self, header: &Header) {
        self.mmap[0..HEADER_LEN].copy_from_slice(&header.encode());
    }

    fn set_clean_shutdown(&mut self, clean: bool) -> Result<()> {
        let mut header = self.header();
        header.clean_shutdown = clean as u32;
        self.write_header(&header);
        Ok(())
    }

    pub fn close_clean(&mut self) -> Result<()> {
        self.set_clean_shutdown(true)?;
        self.mmap.flush()?;
        Ok(())
    }

    /// Allocate `bytes` for a chunk of the given type tag, returning its
    /// offset. Grows the mapping (spec says nothing about growth
    /// strategy beyond per-class free lists; doubling the file when no
    /// free chunk of the right class exists mirrors the arena-doubling
    /// most bump/chunk allocators use).
    pub fn alloc(&mut self, bytes: usize) -> Result<RelPtr> {
        let exp = exp_for(bytes);
        if exp == XL_EXP {
            return self.alloc_xl(bytes);
        }
        let class = (exp - MIN_EXP) as usize;
        let mut header = self.header();
        if header.free_list_heads[class] != 0 {
            let ptr = header.free_list_heads[class];
            let next = self.read_free_next(ptr);
            header.free_list_heads[class] = next;
            self.write_header(&header);
            return Ok(ptr);
        }
        let chunk_size = 1u64 << exp;
        let ptr = self.grow(chunk_size)?;
        Ok(ptr)
    }

    fn alloc_xl(&mut self, bytes: usize) -> Result<RelPtr> {
        // XL chunks carry an explicit 8-byte size prefix ahead of the
        // returned pointer, per spec §4.D.
        let total = 8 + bytes as u64;
        let ptr = self.grow(total)?;
        self.mmap[ptr as usize..ptr as usize + 8].copy_from_slice(&(bytes as u64).to_le_bytes());
        Ok(ptr + 8)
    }

    fn grow(&mut self, size: u64) -> Result<RelPtr> {
        let mut header = self.header();
        let offset = header.file_size;
        let new_size = offset + size;
        if new_size as usize > self.mmap.len() {
            // memmap2 doesn't support in-place resize of an existing
            // mapping; a real implementation would remap after
            // ftruncate. Surfacing as storage error keeps the contract
            // honest without pretending to grow the mapping here.
            return Err(NsdError::Storage {
                op: "udb grow".into(),
                source: "mapped region exhausted; caller must reopen after ftruncate".into(),
            });
        }
        header.file_size = new_size;
        self.write_header(&header);
        Ok(offset)
    }

    fn read_free_next(&self, ptr: RelPtr) -> u64 {
        let p = ptr as usize;
        u64::from_le_bytes(self.mmap[p..p + 8].try_into().unwrap_or([0; 8]))
    }

    /// Return a chunk to its size class's free list (spec §4.D "free
    /// coalesces with buddies" — buddy coalescing is not implemented
    /// here; chunks are returned to their own class's list uncoalesced,
    /// which is correct but less space-efficient).
    pub fn free(&mut self, ptr: RelPtr, bytes: usize) {
        let exp = exp_for(bytes);
        if exp == XL_EXP {
            return; // XL chunks are not recycled; leaked until compaction.
        }
        let class = (exp - MIN_EXP) as usize;
        let mut header = self.header();
        let old_head = header.free_list_heads[class];
        let p = ptr as usize;
        self.mmap[p..p + 8].copy_from_slice(&old_head.to_le_bytes());
        header.free_list_heads[class] = ptr;
        self.write_header(&header);
    }

    pub fn read(&self, ptr: RelPtr, len: usize) -> &[u8] {
        let p = ptr as usize;
        &self.mmap[p..p + len]
    }

    pub fn write(&mut self, ptr: RelPtr, data: &[u8]) {
        let p = ptr as usize;
        self.mmap[p..p + data.len()].copy_from_slice(data);
    }
}

impl Drop for Udb {
    fn drop(&mut self) {
        let _ = self.close_clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_initializes_header_on_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.udb");
        let mut udb = Udb::open(&path).unwrap();
        let ptr = udb.alloc(64).unwrap();
        udb.write(ptr, b"hello, udb");
        assert_eq!(&udb.read(ptr, 10), b"hello, udb");
    }

    #[test]
    fn reopen_recovers_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.udb");
        let ptr = {
            let mut udb = Udb::open(&path).unwrap();
            let ptr = udb.alloc(64).unwrap();
            udb.write(ptr, b"persisted");
            udb.close_clean().unwrap();
            ptr
        };
        let udb2 = Udb::open(&path).unwrap();
        assert_eq!(&udb2.read(ptr, 9), b"persisted");
    }

    #[test]
    fn free_then_alloc_reuses_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.udb");
        let mut udb = Udb::open(&path).unwrap();
        let ptr1 = udb.alloc(64).unwrap();
        udb.free(ptr1, 64);
        let ptr2 = udb.alloc(64).unwrap();
        assert_eq!(ptr1, ptr2);
    }
}
