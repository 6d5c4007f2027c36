//! Replace-in-place copy of single entries

use crate::types::MirrorError;
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

const BUFFER_SIZE: usize = 128 * 1024;
const PART_PREFIX: &str = ".backmirror-";
const PART_SUFFIX: &str = ".part";

/// Copy one non-directory entry over `dest`, without following symlinks.
///
/// Regular files go through [`copy_file_atomic`], symlinks through
/// [`copy_symlink`]. Anything else is rejected.
///
/// # Returns
/// * `Ok(u64)` - Number of content bytes written (0 for symlinks)
pub fn copy_entry(src: &Path, dest: &Path) -> Result<u64, MirrorError> {
    let metadata = fs::symlink_metadata(src)?;
    let file_type = metadata.file_type();

    if file_type.is_symlink() {
        copy_symlink(src, dest, &metadata).map(|_| 0)
    } else if file_type.is_file() {
        copy_file_atomic(src, dest, &metadata)
    } else {
        Err(MirrorError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a regular file or symlink: {}", src.display()),
        )))
    }
}

/// Copy a regular file with the write-then-rename strategy.
///
/// Content is streamed into a uniquely named hidden sibling, synced, stamped
/// with the source permissions and timestamps, then renamed over `dest`. The
/// sibling is created exclusively, so it can never clobber another entry of
/// the same directory. An empty directory sitting at `dest` is removed first;
/// a non-empty one fails the copy.
pub fn copy_file_atomic(src: &Path, dest: &Path, metadata: &fs::Metadata) -> Result<u64, MirrorError> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // Dropping `part` on any early return deletes it
    let mut part = tempfile::Builder::new()
        .prefix(PART_PREFIX)
        .suffix(PART_SUFFIX)
        .tempfile_in(parent)?;

    let total_bytes = stream_into(src, part.as_file_mut())?;
    stamp_metadata(part.path(), metadata)?;
    clear_directory_at(dest)?;
    part.persist(dest).map_err(|err| MirrorError::Io(err.error))?;

    Ok(total_bytes)
}

fn stream_into(src: &Path, part_file: &mut File) -> Result<u64, MirrorError> {
    let mut src_file = File::open(src)?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total_bytes = 0u64;
    loop {
        let bytes_read = src_file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        part_file.write_all(&buffer[..bytes_read])?;
        total_bytes += bytes_read as u64;
    }

    // Flush to disk before the rename makes the file visible
    part_file.sync_all()?;
    Ok(total_bytes)
}

/// Recreate a symlink at `dest` pointing at the same target as `src`.
///
/// Whatever non-directory entry sits at `dest` (or an empty directory) is replaced.
pub fn copy_symlink(src: &Path, dest: &Path, metadata: &fs::Metadata) -> Result<(), MirrorError> {
    let target = fs::read_link(src)?;

    match fs::symlink_metadata(dest) {
        Ok(existing) if existing.is_dir() => fs::remove_dir(dest)?,
        Ok(_) => fs::remove_file(dest)?,
        Err(_) => {}
    }

    create_symlink(&target, dest)?;

    let atime = FileTime::from_last_access_time(metadata);
    let mtime = FileTime::from_last_modification_time(metadata);
    filetime::set_symlink_file_times(dest, atime, mtime)?;
    Ok(())
}

/// Remove one destination entry without following symlinks.
///
/// Directories must already be empty.
pub fn remove_entry(path: &Path) -> Result<(), MirrorError> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_dir() {
        fs::remove_dir(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn stamp_metadata(path: &Path, metadata: &fs::Metadata) -> Result<(), MirrorError> {
    fs::set_permissions(path, metadata.permissions())?;
    let atime = FileTime::from_last_access_time(metadata);
    let mtime = FileTime::from_last_modification_time(metadata);
    filetime::set_file_times(path, atime, mtime)?;
    Ok(())
}

fn clear_directory_at(dest: &Path) -> Result<(), MirrorError> {
    match fs::symlink_metadata(dest) {
        Ok(existing) if existing.is_dir() => fs::remove_dir(dest).map_err(MirrorError::Io),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link_path: &Path) -> Result<(), MirrorError> {
    std::os::unix::fs::symlink(target, link_path).map_err(MirrorError::Io)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link_path: &Path) -> Result<(), MirrorError> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    match symlink_file(target, link_path) {
        Ok(()) => Ok(()),
        Err(file_err) => match symlink_dir(target, link_path) {
            Ok(()) => Ok(()),
            Err(_) => Err(MirrorError::Io(file_err)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(PART_PREFIX))
            .collect()
    }

    #[test]
    fn test_failed_copy_leaves_no_part_file() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("occupied");
        fs::write(&src, b"data").expect("write src");
        fs::create_dir(&dest).expect("create dest dir");
        fs::write(dest.join("inner.txt"), b"keep").expect("write inner");

        let metadata = fs::symlink_metadata(&src).expect("metadata");
        assert!(copy_file_atomic(&src, &dest, &metadata).is_err());
        assert!(part_files(dir.path()).is_empty());
        assert!(dest.join("inner.txt").exists());
    }

    #[test]
    fn test_empty_directory_is_replaced_by_file() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("was-dir");
        fs::write(&src, b"data").expect("write src");
        fs::create_dir(&dest).expect("create dest dir");

        let bytes = copy_entry(&src, &dest).expect("copy over empty dir");
        assert_eq!(bytes, 4);
        assert_eq!(fs::read(&dest).expect("read dest"), b"data");
    }

    #[test]
    fn test_remove_entry_refuses_non_empty_directory() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).expect("create sub");
        fs::write(sub.join("f"), b"x").expect("write f");

        assert!(remove_entry(&sub).is_err());
        remove_entry(&sub.join("f")).expect("remove file");
        remove_entry(&sub).expect("remove empty dir");
        assert!(!sub.exists());
    }
}
