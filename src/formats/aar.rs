//! AAR — an archive container with an indexed directory and optionally
//! name-obfuscated entries.
//!
//! Compressed entries wrap their zlib payload in a small secondary `ZLB`
//! framing; that framing is unpacked here rather than given its own module
//! since nothing outside this reader needs to know it exists.

use std::collections::HashMap;

use log::{debug, trace};

use crate::byte_cursor::ByteCursor;
use crate::error::{ErrorKind, Result};
use crate::inflate::inflate;

const ZLB_MAGIC: &[u8; 4] = b"ZLB\0";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Raw,
    Compressed,
    Symlink,
}

impl EntryKind {
    fn from_i32(v: i32) -> Option<EntryKind> {
        match v {
            0 => Some(EntryKind::Raw),
            1 => Some(EntryKind::Compressed),
            2 => Some(EntryKind::Symlink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub offset: u32,
    pub size: u32,
    pub kind: EntryKind,
    pub name: String,
    pub symlink_target: Option<String>,
}

pub struct AarArchive<'a> {
    buf: &'a [u8],
    entries: Vec<Entry>,
    /// original-case names, in directory order
    names: Vec<String>,
    /// lowercased name -> index into `entries`/`names`
    by_name: HashMap<String, usize>,
}

/// Un-obfuscates a v2 name byte: `b ↦ (b - 0x60) mod 256`.
fn unmask_v2(b: u8) -> u8 {
    b.wrapping_sub(0x60)
}

impl<'a> AarArchive<'a> {
    pub fn open(buf: &'a [u8]) -> Result<AarArchive<'a>> {
        let mut cur = ByteCursor::new(buf);

        let magic = cur.fourcc()?;
        crate::check!(&magic == b"AAR\0", ErrorKind::BadMagic("aar".into(), "AAR\\0".into(), 0));
        let version = cur.u32_le()?;
        crate::check!(
            version == 0 || version == 2,
            ErrorKind::UnsupportedVersion("aar".into(), version as i64)
        );
        let nr_entries = cur.u32_le()?;
        let first_entry_offset = cur.u32_le()?;

        debug!("aar: version={} nr_entries={} first_entry_offset={}", version, nr_entries, first_entry_offset);

        let index_bytes = buf.get(12..first_entry_offset as usize).ok_or_else(|| {
            ErrorKind::Truncated("aar index".into(), 12)
        })?;
        let mut index_cur = ByteCursor::new(index_bytes);

        let unmask = if version == 2 { Some(unmask_v2 as fn(u8) -> u8) } else { None };

        let mut entries = Vec::with_capacity(nr_entries as usize);
        for _ in 0..nr_entries {
            let offset = index_cur.u32_le()?;
            let size = index_cur.u32_le()?;
            let raw_kind = index_cur.i32_le()?;
            let kind = EntryKind::from_i32(raw_kind).ok_or_else(|| {
                ErrorKind::NotImplemented(format!("aar entry type {}", raw_kind))
            })?;
            let name = index_cur.cstr(unmask)?;
            let name = String::from_utf8_lossy(&name).into_owned();

            let symlink_target = if version == 2 {
                let t = index_cur.cstr(unmask)?;
                Some(String::from_utf8_lossy(&t).into_owned())
            } else {
                None
            };

            trace!("aar entry: {} kind={:?} offset={} size={}", name, kind, offset, size);

            entries.push(Entry { offset, size, kind, name, symlink_target });
        }

        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        let mut by_name = HashMap::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            by_name.insert(e.name.to_lowercase(), i);
        }

        Ok(AarArchive { buf, entries, names, by_name })
    }

    /// Original-case names, in directory (insertion) order.
    pub fn filenames(&self) -> &[String] {
        &self.names
    }

    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_lowercase())
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(&name.to_lowercase()).map(|&i| &self.entries[i])
    }

    pub fn load(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.entry(name).ok_or_else(|| {
            ErrorKind::NotImplemented(format!("no such entry: {}", name))
        })?;
        self.load_entry(entry)
    }

    fn load_entry(&self, entry: &Entry) -> Result<Vec<u8>> {
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        let slice = self.buf.get(start..end).ok_or_else(|| {
            ErrorKind::Truncated(format!("aar entry {}", entry.name), start)
        })?;

        match entry.kind {
            EntryKind::Raw => Ok(slice.to_vec()),
            EntryKind::Compressed => decode_zlb(&entry.name, slice, entry.size),
            EntryKind::Symlink => Err(ErrorKind::NotImplemented(
                format!("symlink entries are not supported: {}", entry.name),
            )
            .into()),
        }
    }
}

/// Unwraps the `ZLB\0` framing wrapped around a compressed entry's payload
/// and inflates it.
fn decode_zlb(entry_name: &str, slice: &[u8], entry_size: u32) -> Result<Vec<u8>> {
    let mut cur = ByteCursor::new(slice);

    let magic = cur.fourcc()?;
    crate::check!(&magic == ZLB_MAGIC, ErrorKind::BadMagic("zlb".into(), "ZLB\\0".into(), 0));
    let version = cur.u32_le()?;
    crate::check!(version == 0, ErrorKind::UnsupportedVersion("zlb".into(), version as i64));
    let out_size = cur.u32_le()?;
    let in_size = cur.u32_le()?;

    crate::check!(
        in_size + 16 == entry_size,
        ErrorKind::SizeMismatch((entry_size as i64 - 16).max(0) as usize, in_size as usize)
    );

    let payload = cur.bytes(in_size as usize)?;
    inflate(payload, out_size as usize)
}
