// SPDX-License-Identifier: MIT

use super::*;
use smak_core::StringInterner;
use tempfile::tempdir;

#[test]
fn append_then_replay_round_trips() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("master.wal");
    let interner = StringInterner::new();
    let a = interner.intern_target("a");
    let b = interner.intern_target("b");

    {
        let mut wal = MasterWal::open(&path).expect("open");
        wal.append(&MasterEvent::TargetDone(a)).expect("append");
        wal.append(&MasterEvent::TargetFailed(b, 1)).expect("append");
    }

    let events = MasterWal::replay(&path).expect("replay");
    assert_eq!(events, vec![MasterEvent::TargetDone(a), MasterEvent::TargetFailed(b, 1)]);
}

#[test]
fn replay_missing_file_is_empty() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("absent.wal");
    assert_eq!(MasterWal::replay(&path).expect("replay"), Vec::new());
}

#[test]
fn replay_skips_corrupt_lines() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("master.wal");
    let interner = StringInterner::new();
    let a = interner.intern_target("a");

    {
        let mut wal = MasterWal::open(&path).expect("open");
        wal.append(&MasterEvent::TargetDone(a)).expect("append");
    }
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).expect("open raw");
        writeln!(file, "{{not valid json").expect("write garbage");
    }

    let events = MasterWal::replay(&path).expect("replay");
    assert_eq!(events, vec![MasterEvent::TargetDone(a)]);
}

#[test]
fn clear_truncates_log() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("master.wal");
    let interner = StringInterner::new();
    let a = interner.intern_target("a");

    let mut wal = MasterWal::open(&path).expect("open");
    wal.append(&MasterEvent::TargetDone(a)).expect("append");
    wal.clear();
    drop(wal);

    assert_eq!(MasterWal::replay(&path).expect("replay"), Vec::new());
}
