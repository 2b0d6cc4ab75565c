use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::api::log_reader::LogReader;
use crate::api::log_writer::LogWriter;
use crate::errors::downcast_ref;
use crate::errors::ActiveOperationsPresent;
use crate::tests::context::TestContext;
use crate::tests::sample_data::change;
use crate::tests::sample_data::end;
use crate::tests::sample_data::fuzzy_checkpoint;
use crate::tests::sample_data::non_tx;
use crate::tests::sample_data::start;
use crate::LogSequenceNumber as Lsn;
use crate::WALRecord;
use crate::WriteAheadLog;

fn small_segments() -> Result<(TestContext, WriteAheadLog), io::Error> {
    let mut ctx = TestContext::new()?;
    ctx.config.max_segment_size = Some(256);
    let wal = ctx.new_wal()?;
    Ok((ctx, wal))
}

#[test]
fn test_rotate_when_full() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    let mut lsns = vec![];
    while wal.active_segment() == 0 {
        lsns.push(wal.log(&non_tx())?);
    }

    // The record that filled segment 0 is the last one in it.
    let last = *lsns.last().unwrap();
    assert_eq!(0, last.segment());
    assert_eq!(vec![0], wal.non_active_segments());

    let first_in_1 = wal.log(&non_tx())?;
    assert_eq!(Lsn::new(1, 28), first_in_1);
    assert_eq!(Some(first_in_1), wal.next(last)?);

    lsns.push(first_in_1);
    let got = wal.iter()?.map(|r| r.map(|(lsn, _)| lsn)).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(lsns, got);

    Ok(())
}

#[test]
fn test_rotation_waits_for_open_operations() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    let s1 = wal.log(&start(1))?;
    let s2 = wal.log(&start(2))?;

    while wal.size() < 300 {
        wal.log(&change(1, 40))?;
    }
    assert_eq!(0, wal.active_segment());
    assert_eq!(2, wal.stat().active_operations);

    let e1 = wal.log(&end(1))?;
    assert_eq!(0, wal.active_segment(), "operation 2 is still open");

    // Records outside of any operation do not rotate either
    wal.log(&non_tx())?;
    assert_eq!(0, wal.active_segment());

    let e2 = wal.log(&end(2))?;
    assert_eq!(1, wal.active_segment());

    for lsn in [s1, s2, e1, e2] {
        assert_eq!(0, lsn.segment());
    }

    Ok(())
}

#[test]
fn test_start_blocks_while_rotation_pending() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;
    let wal = Arc::new(wal);

    wal.log(&start(1))?;
    while wal.size() < 300 {
        wal.log(&change(1, 40))?;
    }

    let started = Arc::new(AtomicBool::new(false));

    let handle = {
        let wal = wal.clone();
        let started = started.clone();
        thread::spawn(move || {
            let lsn = wal.log(&start(2));
            started.store(true, Ordering::SeqCst);
            lsn
        })
    };

    thread::sleep(Duration::from_millis(200));
    assert!(!started.load(Ordering::SeqCst), "start of 2 must wait");

    // Records of the open operation go on
    wal.log(&change(1, 40))?;

    let e1 = wal.log(&end(1))?;
    assert_eq!(0, e1.segment());

    let s2 = handle.join().unwrap()?;
    assert_eq!(Lsn::new(1, 28), s2);

    Ok(())
}

#[test]
fn test_start_rotates_pending_segment() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    // A record of an operation whose start is not in this log keeps the
    // rotation pending.
    while wal.size() < 300 {
        wal.log(&change(9, 40))?;
    }
    assert_eq!(0, wal.active_segment());

    let s = wal.log(&start(1))?;
    assert_eq!(Lsn::new(1, 28), s);

    Ok(())
}

/// Concurrent operations never have their start and end in different
/// segments.
#[test]
fn test_concurrent_operations_not_split() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;
    let wal = Arc::new(wal);

    let threads = 4u64;
    let ops_per_thread = 30u64;

    let handles = (0..threads)
        .map(|t| {
            let wal = wal.clone();
            thread::spawn(move || -> Result<(), io::Error> {
                for i in 0..ops_per_thread {
                    let op = t * 1000 + i;
                    wal.log(&start(op))?;
                    for j in 0..(i % 4) {
                        wal.log(&change(op, 30 + j as usize * 20))?;
                    }
                    wal.log(&end(op))?;
                    if i % 5 == 0 {
                        wal.log(&non_tx())?;
                    }
                }
                Ok(())
            })
        })
        .collect::<Vec<_>>();

    for h in handles {
        h.join().unwrap()?;
    }

    assert!(wal.non_active_segments().len() > 2);

    let mut start_segments = BTreeMap::new();
    let mut end_segments = BTreeMap::new();

    for res in wal.iter()? {
        let (lsn, rec) = res?;
        match rec {
            WALRecord::AtomicUnitStart(s) => {
                start_segments.insert(s.operation_unit_id, lsn.segment());
            }
            WALRecord::AtomicUnitEnd(e) => {
                end_segments.insert(e.operation_unit_id, lsn.segment());
            }
            WALRecord::HighLevelTransactionChange {
                operation_unit_id, ..
            } => {
                assert_eq!(
                    Some(&lsn.segment()),
                    start_segments.get(&operation_unit_id)
                );
            }
            _ => {}
        }
    }

    assert_eq!((threads * ops_per_thread) as usize, start_segments.len());
    assert_eq!(start_segments, end_segments);

    Ok(())
}

#[test]
fn test_append_new_segment() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    // Empty tail
    assert!(!wal.append_new_segment()?);

    wal.log(&non_tx())?;
    assert!(wal.append_new_segment()?);
    assert_eq!(1, wal.active_segment());
    assert_eq!(None, wal.begin_of_segment(1)?);
    assert_eq!(Some(Lsn::new(0, 28)), wal.begin_of_segment(0)?);

    wal.log(&start(1))?;
    let err = wal.append_new_segment().unwrap_err();
    assert_eq!(
        Some(&ActiveOperationsPresent::new(1, "appending new segment")),
        downcast_ref::<ActiveOperationsPresent>(&err)
    );

    wal.log(&end(1))?;
    assert!(wal.append_new_segment()?);
    assert_eq!(vec![0, 1], wal.non_active_segments());

    Ok(())
}

#[test]
fn test_cut_till() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    wal.log(&non_tx())?;
    let cp = wal.log(&fuzzy_checkpoint())?;
    assert_eq!(Some(cp), wal.last_checkpoint());

    while wal.active_segment() < 4 {
        wal.log(&non_tx())?;
    }
    wal.log(&non_tx())?;
    assert_eq!(vec![0, 1, 2, 3], wal.non_active_segments());

    let size = wal.size();

    // Inside segment 2: only 0 and 1 go
    let lsn = wal.begin_of_segment(2)?.unwrap();
    let lsn = Lsn::new(2, lsn.position() + 18);
    assert!(wal.cut_till(lsn)?);

    assert_eq!(vec![2, 3], wal.non_active_segments());
    assert!(wal.begin()? >= wal.begin_of_segment(2)?);
    assert_eq!(Some(Lsn::new(2, 28)), wal.begin()?);
    assert!(wal.size() < size);

    // Cut away records are not found
    assert_eq!(None, wal.read(Lsn::new(0, 28))?);
    assert_eq!(None, wal.next(Lsn::new(1, 28))?);

    // The checkpoint was in segment 0
    assert_eq!(None, wal.last_checkpoint());

    // Nothing more to cut
    assert!(!wal.cut_till(lsn)?);

    // The tail is never removed
    let end = wal.end()?.unwrap();
    assert!(wal.cut_till(Lsn::new(end.segment() + 10, 0))?);
    assert_eq!(Vec::<u64>::new(), wal.non_active_segments());
    assert_eq!(4, wal.active_segment());
    assert_eq!(Some(end), wal.end()?);

    Ok(())
}

#[test]
fn test_cut_till_keeps_checkpoint() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    while wal.active_segment() < 2 {
        wal.log(&non_tx())?;
    }
    let cp = wal.log(&fuzzy_checkpoint())?;
    assert_eq!(2, cp.segment());

    wal.cut_till(cp)?;
    assert_eq!(Some(cp), wal.last_checkpoint());

    Ok(())
}

#[test]
fn test_cut_till_limit() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    while wal.active_segment() < 4 {
        wal.log(&non_tx())?;
    }

    let limit = Lsn::new(1, 28);
    wal.add_cut_till_limit(limit);
    wal.add_cut_till_limit(limit);

    wal.cut_till(Lsn::new(3, 28))?;
    assert_eq!(vec![1, 2, 3], wal.non_active_segments());

    wal.cut_all_segments_smaller_than(3)?;
    assert_eq!(vec![1, 2, 3], wal.non_active_segments());

    wal.remove_cut_till_limit(limit)?;
    wal.cut_till(Lsn::new(3, 28))?;
    assert_eq!(vec![1, 2, 3], wal.non_active_segments(), "one reference left");

    wal.remove_cut_till_limit(limit)?;
    assert!(wal.remove_cut_till_limit(limit).is_err());

    wal.cut_all_segments_smaller_than(3)?;
    assert_eq!(vec![3], wal.non_active_segments());

    Ok(())
}

#[test]
fn test_truncate() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    while wal.active_segment() < 3 {
        wal.log(&non_tx())?;
    }
    let last = wal.log(&non_tx())?;

    wal.truncate()?;

    assert_eq!(Vec::<u64>::new(), wal.non_active_segments());
    assert_eq!(1, wal.segment_paths().len());
    assert_eq!(Some(Lsn::new(3, 28)), wal.begin()?);
    assert_eq!(Some(last), wal.end()?);

    // Still writable
    let lsn = wal.log(&non_tx())?;
    assert_eq!(Some(lsn), wal.next(last)?);

    Ok(())
}

#[test]
fn test_move_lsn_after() -> Result<(), io::Error> {
    let (_ctx, wal) = small_segments()?;

    let a = wal.log(&non_tx())?;

    wal.move_lsn_after(Lsn::new(10, 5000))?;
    assert_eq!(11, wal.active_segment());

    let b = wal.log(&non_tx())?;
    assert_eq!(Lsn::new(11, 28), b);
    assert_eq!(Some(b), wal.next(a)?);

    // Already after
    wal.move_lsn_after(Lsn::new(3, 0))?;
    assert_eq!(11, wal.active_segment());

    wal.log(&start(1))?;
    let err = wal.move_lsn_after(Lsn::new(20, 0)).unwrap_err();
    assert!(downcast_ref::<ActiveOperationsPresent>(&err).is_some());

    Ok(())
}
