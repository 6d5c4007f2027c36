//! Main mirror command

use crate::config::Config;
use crate::engine::MirrorEngine;
use crate::events::{Event, Topic};
use crate::types::{MirrorError, StatKind, Statistics};
use crate::ui::BackupProgress;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Result of one command-line run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOutcome {
    pub success: bool,
    pub statistics: Statistics,
}

/// Run one mirror over `pairs` and render it on the terminal.
///
/// Bad paths are rejected before anything is touched. Returns once the run
/// has fully drained.
pub fn run(config: Config, pairs: &[(PathBuf, PathBuf)], json: bool) -> Result<MirrorOutcome, MirrorError> {
    let engine = MirrorEngine::new(config);
    engine.set_paths(pairs)?;

    let reporter = Arc::new(Mutex::new(if json {
        BackupProgress::hidden()
    } else {
        BackupProgress::new()
    }));
    let finished: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));

    {
        let reporter = Arc::clone(&reporter);
        engine.subscribe(Topic::Console, move |event| {
            if let Event::Console(line) = event {
                reporter
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .console_line(line);
            }
        });
    }
    {
        let reporter = Arc::clone(&reporter);
        engine.subscribe(Topic::Progress, move |event| {
            if let Event::Progress(percent) = event {
                reporter
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_percent(*percent);
            }
        });
    }
    {
        let reporter = Arc::clone(&reporter);
        let finished = Arc::clone(&finished);
        engine.subscribe(Topic::Finish, move |event| {
            if let Event::Finish(success) = event {
                *finished.lock().unwrap_or_else(PoisonError::into_inner) = Some(*success);
                reporter
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .finish(*success);
            }
        });
    }

    if !json {
        println!("{} of {} pair(s)", engine.backup_type(), pairs.len());
    }

    engine.execute()?;
    engine.join_and_dispose();

    let success = finished
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .unwrap_or(false);
    let statistics = engine.last_statistics().unwrap_or_default();

    if json {
        println!("{:#}", format_json_summary(engine.backup_type(), &statistics, success));
    } else if !statistics.is_successful() {
        println!("{}", format_error_summary(&statistics));
    }

    Ok(MirrorOutcome {
        success,
        statistics,
    })
}

fn format_json_summary(backup_type: &str, statistics: &Statistics, success: bool) -> Value {
    let counts: Map<String, Value> = statistics
        .iter()
        .map(|(kind, count)| (kind.key().to_string(), Value::from(count)))
        .collect();

    json!({
        "backup_type": backup_type,
        "success": success,
        "statistics": counts,
    })
}

fn format_error_summary(statistics: &Statistics) -> String {
    let mut lines = vec!["Error summary:".to_string()];
    for kind in StatKind::ALL.iter().filter(|kind| kind.is_error()) {
        let count = statistics.get(*kind);
        if count > 0 {
            lines.push(format!("  {}: {}", kind.label(), count));
        }
    }
    lines.join("\n")
}
