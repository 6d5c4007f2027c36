//! Mirroring pass: make `destination/<leaf>` a copy of `source`
//!
//! One call handles one pair and owns its `Statistics` until it returns.
//! The copy walk runs first; the prune walk only runs when the destination
//! leaf existed before this run.

use super::compare::{files_equivalent, is_same_file_type};
use crate::engine::RunContext;
use crate::executor::{copy_entry, remove_entry};
use crate::types::{StatKind, Statistics};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Mirror `source` into `destination/<source name>`.
///
/// Per-entry failures are counted and reported, never propagated. The stop flag
/// is checked before every entry of both walks; a stop leaves completed work
/// in place and returns the counts gathered so far.
pub fn mirror_pair(ctx: &RunContext, source: &Path, destination: &Path) -> Statistics {
    let mut stats = Statistics::new();
    let leaf = leaf_for(source, destination);

    let fresh = match prepare_leaf(&leaf) {
        Ok(created) => created,
        Err(err) => {
            stats.increment(StatKind::FailedDirCreations);
            ctx.problem(format!(
                "Cannot finish backup of {}: cannot create {}: {}",
                source.display(),
                leaf.display(),
                err
            ));
            return stats;
        }
    };
    if fresh {
        stats.increment(StatKind::CreatedDirs);
        ctx.console(format!("Created directory: {}", leaf.display()));
    }

    if !copy_tree(ctx, &mut stats, source, &leaf) {
        debug!(source = %source.display(), "copy walk stopped");
        return stats;
    }

    if fresh {
        debug!(leaf = %leaf.display(), "fresh destination, nothing to prune");
    } else if !prune_tree(ctx, &mut stats, source, &leaf) {
        debug!(leaf = %leaf.display(), "prune walk stopped");
    }

    stats
}

/// Destination directory that mirrors `source`: `destination` joined with the source's own name
pub fn leaf_for(source: &Path, destination: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) => destination.join(name),
        None => destination.to_path_buf(),
    }
}

// Ok(true) when the leaf had to be created.
fn prepare_leaf(leaf: &Path) -> std::io::Result<bool> {
    match fs::symlink_metadata(leaf) {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "a non-directory entry is in the way",
        )),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir(leaf)?;
            Ok(true)
        }
        Err(err) => Err(err),
    }
}

// Returns false when interrupted by a stop request.
fn copy_tree(ctx: &RunContext, stats: &mut Statistics, source: &Path, leaf: &Path) -> bool {
    let copy_hidden = ctx.copy_hidden();
    let mut walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| copy_hidden || entry.depth() == 0 || !is_hidden(entry));

    loop {
        if ctx.is_stopped() {
            return false;
        }

        let entry = match walker.next() {
            None => return true,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                record_unvisited(ctx, stats, &err);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = leaf.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            match ensure_dir(&target) {
                Ok(true) => {
                    stats.increment(StatKind::CreatedDirs);
                    ctx.console(format!("Created directory: {}", target.display()));
                }
                Ok(false) => {}
                Err(err) => {
                    stats.increment(StatKind::FailedDirCreations);
                    ctx.problem(format!(
                        "Cannot create directory {}: {}; skipping {}",
                        target.display(),
                        err,
                        entry.path().display()
                    ));
                    walker.skip_current_dir();
                }
            }
        } else if file_type.is_file() || file_type.is_symlink() {
            mirror_file(ctx, stats, &entry, &target);
        } else {
            stats.increment(StatKind::UnvisitedFiles);
            ctx.problem(format!("Skipping special file {}", entry.path().display()));
        }
    }
}

fn mirror_file(ctx: &RunContext, stats: &mut Statistics, entry: &DirEntry, target: &Path) {
    let metadata = match entry.metadata() {
        Ok(metadata) => metadata,
        Err(err) => {
            stats.increment(StatKind::UnvisitedFiles);
            ctx.problem(format!("Cannot visit {}: {}", entry.path().display(), err));
            return;
        }
    };
    // Symlinks count zero bytes, matching the sizing pass
    let size = if metadata.is_file() { metadata.len() } else { 0 };

    let up_to_date =
        is_same_file_type(&metadata, target) && files_equivalent(ctx.mode(), entry.path(), target);

    if up_to_date {
        debug!(path = %entry.path().display(), "unchanged");
    } else {
        match copy_entry(entry.path(), target) {
            Ok(_) => {
                stats.increment(StatKind::CopiedFiles);
                ctx.console(format!(
                    "Copied: {} -> {}",
                    entry.path().display(),
                    target.display()
                ));
            }
            Err(err) => {
                stats.increment(StatKind::FailedCopies);
                ctx.problem(format!("Cannot copy {}: {}", entry.path().display(), err));
            }
        }
    }

    ctx.advance(size);
}

// Ok(true) when a directory was created; a non-directory in the way is replaced.
fn ensure_dir(target: &Path) -> std::io::Result<bool> {
    match fs::symlink_metadata(target) {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => {
            fs::remove_file(target)?;
            fs::create_dir(target)?;
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir(target)?;
            Ok(true)
        }
        Err(err) => Err(err),
    }
}

// Returns false when interrupted by a stop request.
fn prune_tree(ctx: &RunContext, stats: &mut Statistics, source: &Path, leaf: &Path) -> bool {
    let mut walker = WalkDir::new(leaf)
        .follow_links(false)
        .contents_first(true)
        .into_iter();

    loop {
        if ctx.is_stopped() {
            return false;
        }

        let entry = match walker.next() {
            None => return true,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                record_unvisited(ctx, stats, &err);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(leaf) else {
            continue;
        };

        if entry.file_type().is_dir() {
            if is_real_dir_chain(source, relative) {
                continue;
            }
            match remove_entry(entry.path()) {
                Ok(()) => {
                    stats.increment(StatKind::RemovedDirs);
                    ctx.console(format!("Removed directory: {}", entry.path().display()));
                }
                Err(err) => {
                    stats.increment(StatKind::FailedDirRemovals);
                    ctx.problem(format!(
                        "Cannot remove directory {}: {}",
                        entry.path().display(),
                        err
                    ));
                }
            }
        } else if counterpart_missing(source, relative) {
            match remove_entry(entry.path()) {
                Ok(()) => {
                    stats.increment(StatKind::RemovedFiles);
                    ctx.console(format!("Removed file: {}", entry.path().display()));
                }
                Err(err) => {
                    stats.increment(StatKind::FailedRemovals);
                    ctx.problem(format!("Cannot remove {}: {}", entry.path().display(), err));
                }
            }
        }
    }
}

// Only a definite absence counts; an unreadable source entry keeps its copy.
// A source ancestor that is no longer a real directory (e.g. replaced by a
// symlink) makes everything below it absent.
fn counterpart_missing(source: &Path, relative: &Path) -> bool {
    if let Some(parent) = relative.parent() {
        if !is_real_dir_chain(source, parent) {
            return true;
        }
    }
    match fs::symlink_metadata(source.join(relative)) {
        Ok(_) => false,
        Err(err) => err.kind() == ErrorKind::NotFound,
    }
}

// True when `source` joined with every prefix of `relative` is a directory,
// without following symlinks.
fn is_real_dir_chain(source: &Path, relative: &Path) -> bool {
    let mut current = source.to_path_buf();
    for component in relative.components() {
        current.push(component);
        if !is_real_dir(&current) {
            return false;
        }
    }
    true
}

fn record_unvisited(ctx: &RunContext, stats: &mut Statistics, err: &walkdir::Error) {
    let is_dir = err.path().map_or(false, is_real_dir);
    stats.increment(if is_dir {
        StatKind::UnvisitedDirs
    } else {
        StatKind::UnvisitedFiles
    });

    let path = err
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    ctx.problem(format!("Cannot visit {}: {}", path, err));
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map_or(false, |name| name.starts_with('.'))
}
