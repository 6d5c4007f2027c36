//! File comparison logic
//!
//! Decides whether a destination entry already holds an up-to-date copy of its
//! source counterpart. Metadata is always read without following symlinks.

use crate::types::CompareMode;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::warn;

const CHUNK_SIZE: usize = 64 * 1024;

/// Kind of a filesystem entry, as seen without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    /// Pipes, sockets, device nodes
    Other,
}

impl EntryKind {
    /// Kind of the entry at `path`, or `None` if nothing is there
    pub fn of(path: &Path) -> Option<EntryKind> {
        fs::symlink_metadata(path).ok().map(|m| Self::from_metadata(&m))
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> EntryKind {
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::Regular
        } else {
            EntryKind::Other
        }
    }
}

/// True iff `destination` exists and has the same kind as the source entry
pub fn is_same_file_type(source: &fs::Metadata, destination: &Path) -> bool {
    EntryKind::of(destination) == Some(EntryKind::from_metadata(source))
}

/// Whether `destination` is considered an up-to-date copy of `source`.
///
/// Any I/O failure while comparing counts as "not equivalent", so the caller
/// falls back to copying.
///
/// - `Content`: symlinks compare their targets, regular files compare lengths and then bytes
/// - `ModifiedTime`: equal last modification times
/// - `ModifiedTimeAndSize`: equal last modification times and equal sizes
pub fn files_equivalent(mode: CompareMode, source: &Path, destination: &Path) -> bool {
    let outcome = match mode {
        CompareMode::Content => same_content(source, destination),
        CompareMode::ModifiedTime => same_mtime(source, destination, false),
        CompareMode::ModifiedTimeAndSize => same_mtime(source, destination, true),
    };

    outcome.unwrap_or_else(|err| {
        warn!(
            source = %source.display(),
            destination = %destination.display(),
            error = %err,
            "comparison failed; treating files as different"
        );
        false
    })
}

fn same_content(source: &Path, destination: &Path) -> io::Result<bool> {
    let src_meta = fs::symlink_metadata(source)?;
    let dst_meta = fs::symlink_metadata(destination)?;

    if src_meta.file_type().is_symlink() || dst_meta.file_type().is_symlink() {
        if !(src_meta.file_type().is_symlink() && dst_meta.file_type().is_symlink()) {
            return Ok(false);
        }
        return Ok(fs::read_link(source)? == fs::read_link(destination)?);
    }

    if src_meta.len() != dst_meta.len() {
        return Ok(false);
    }

    let mut src_file = File::open(source)?;
    let mut dst_file = File::open(destination)?;
    let mut src_buf = vec![0u8; CHUNK_SIZE];
    let mut dst_buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = read_full(&mut src_file, &mut src_buf)?;
        let other = read_full(&mut dst_file, &mut dst_buf)?;
        if read != other || src_buf[..read] != dst_buf[..other] {
            return Ok(false);
        }
        if read == 0 {
            return Ok(true);
        }
    }
}

fn same_mtime(source: &Path, destination: &Path, check_size: bool) -> io::Result<bool> {
    let src_meta = fs::symlink_metadata(source)?;
    let dst_meta = fs::symlink_metadata(destination)?;

    if check_size && src_meta.len() != dst_meta.len() {
        return Ok(false);
    }
    Ok(src_meta.modified()? == dst_meta.modified()?)
}

// Fill `buf` as far as the reader allows; short reads only at EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
