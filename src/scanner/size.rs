//! Sizing pass: total bytes of regular files under a source tree

use crate::engine::RunContext;
use ignore::WalkBuilder;
use std::path::Path;
use tracing::debug;

/// Sum the sizes of every regular file under `source`.
///
/// Symlinks are never followed and contribute nothing. Entries that cannot be
/// read are reported and skipped; the walk always runs to the end unless the
/// run is stopped. Hidden entries are skipped when the run excludes them.
pub fn path_size(source: &Path, ctx: &RunContext) -> u64 {
    let walker = WalkBuilder::new(source)
        .standard_filters(false)
        .hidden(!ctx.copy_hidden())
        .follow_links(false)
        .build();

    let mut total_bytes = 0u64;
    let mut file_count = 0u64;

    for result in walker {
        if ctx.is_stopped() {
            debug!(source = %source.display(), "sizing interrupted by stop request");
            break;
        }

        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                ctx.problem(format!("Cannot size entry: {}", err));
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_symlink() {
            debug!(path = %entry.path().display(), "symlink not counted");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                total_bytes = total_bytes.saturating_add(metadata.len());
                file_count += 1;
            }
            Err(err) => {
                ctx.problem(format!("Cannot read size of {}: {}", entry.path().display(), err));
            }
        }
    }

    debug!(
        source = %source.display(),
        files = file_count,
        bytes = total_bytes,
        "sizing finished"
    );
    total_bytes
}
