//! Scheduler behaviour through the public API, with devices assigned by name

use backmirror::device::{DeviceId, DeviceResolver};
use backmirror::executor::Scheduler;
use backmirror::{MirrorError, PathPair};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Directories named `disk<N>-...` live on device N
struct NamedDisks;

impl DeviceResolver for NamedDisks {
    fn device_of(&self, path: &Path) -> Result<DeviceId, MirrorError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        name.strip_prefix("disk")
            .and_then(|rest| rest.split('-').next())
            .and_then(|digits| digits.parse().ok())
            .map(DeviceId)
            .ok_or_else(|| MirrorError::Config(format!("no disk for {}", name)))
    }
}

fn layout(names: &[(&str, &str)]) -> (TempDir, Vec<PathPair>) {
    let root = TempDir::new().expect("Failed to create temp dir");
    let pairs = names
        .iter()
        .map(|(src, dst)| {
            let source = root.path().join(src);
            let destination = root.path().join(dst);
            std::fs::create_dir_all(&source).expect("create source");
            std::fs::create_dir_all(&destination).expect("create destination");
            PathPair::new(&source, &destination).expect("valid pair")
        })
        .collect();
    (root, pairs)
}

fn scheduler(workers: usize) -> Scheduler {
    Scheduler::with_resolver(workers, Arc::new(NamedDisks))
        .with_join_interval(Duration::from_millis(50))
}

#[test]
fn test_same_devices_run_in_submission_order() {
    let (_root, pairs) = layout(&[
        ("disk1-a", "disk2-a"),
        ("disk1-b", "disk2-b"),
        ("disk1-c", "disk2-c"),
    ]);
    let order: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    let scheduler = scheduler(4);
    let seen = Arc::clone(&order);
    scheduler
        .execute(
            &pairs,
            move |source, _| {
                seen.lock().expect("lock order").push(source.to_path_buf());
                thread::sleep(Duration::from_millis(10));
                Ok(1u32)
            },
            |a: Option<u32>, b: Option<u32>| a.unwrap_or(0) + b.unwrap_or(0),
            move |total| {
                let _ = tx.send(total);
            },
            |_, _| {},
        )
        .expect("execute");
    scheduler.join();

    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).expect("finish"), Some(3));
    let expected: Vec<PathBuf> = pairs.iter().map(|p| p.source().to_path_buf()).collect();
    assert_eq!(*order.lock().expect("lock order"), expected);
}

#[test]
fn test_distinct_devices_overlap() {
    let (_root, pairs) = layout(&[("disk1-a", "disk2-a"), ("disk3-b", "disk4-b")]);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let scheduler = scheduler(2);
    let (running_in, peak_in) = (Arc::clone(&running), Arc::clone(&peak));
    scheduler
        .execute(
            &pairs,
            move |_, _| {
                let now = running_in.fetch_add(1, Ordering::SeqCst) + 1;
                peak_in.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(200));
                running_in.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            |_: Option<()>, _: Option<()>| (),
            |_| {},
            |_, _| {},
        )
        .expect("execute");
    scheduler.join();

    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unresolvable_pair_is_reported_and_skipped() {
    let (_root, pairs) = layout(&[("disk1-a", "disk2-a"), ("other", "disk2-b")]);
    let (tx, rx) = mpsc::channel();
    let mut rejected = Vec::new();

    let scheduler = scheduler(2);
    scheduler
        .execute(
            &pairs,
            |_, _| Ok(5u64),
            |a: Option<u64>, b: Option<u64>| a.unwrap_or(0) + b.unwrap_or(0),
            move |total| {
                let _ = tx.send(total);
            },
            |_, pair| rejected.push(pair.source().to_path_buf()),
        )
        .expect("execute");
    scheduler.join();

    assert_eq!(rejected, vec![pairs[1].source().to_path_buf()]);
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).expect("finish"), Some(5));
}

#[test]
fn test_failed_work_does_not_stop_the_chain() {
    let (_root, pairs) = layout(&[
        ("disk1-a", "disk2-a"),
        ("disk1-fail", "disk2-b"),
        ("disk1-c", "disk2-c"),
    ]);
    let (tx, rx) = mpsc::channel();

    let scheduler = scheduler(1);
    scheduler
        .execute(
            &pairs,
            |source, _| {
                let name = source.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if name.ends_with("fail") {
                    Err(MirrorError::TaskFailed(name.to_string()))
                } else {
                    Ok(10u64)
                }
            },
            |a: Option<u64>, b: Option<u64>| a.unwrap_or(0) + b.unwrap_or(0),
            move |total| {
                let _ = tx.send(total);
            },
            |_, _| {},
        )
        .expect("execute");
    scheduler.join();

    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).expect("finish"), Some(20));
}

#[test]
fn test_all_pairs_unresolvable_finishes_with_none() {
    let (_root, pairs) = layout(&[("nowhere", "disk2-a")]);
    let (tx, rx) = mpsc::channel();

    let scheduler = scheduler(1);
    scheduler
        .execute(
            &pairs,
            |_, _| Ok(1u8),
            |a: Option<u8>, b: Option<u8>| a.or(b).unwrap_or(0),
            move |result| {
                let _ = tx.send(result);
            },
            |_, _| {},
        )
        .expect("execute");
    scheduler.join();

    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).expect("finish"), None);
    assert_eq!(scheduler.outstanding(), 0);
}
