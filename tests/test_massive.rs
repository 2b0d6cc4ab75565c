use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use paged_wal::api::log_reader::LogReader;
use paged_wal::api::log_writer::LogWriter;
use paged_wal::AtomicUnitEnd;
use paged_wal::AtomicUnitStart;
use paged_wal::CheckpointStart;
use paged_wal::Config;
use paged_wal::LogSequenceNumber;
use paged_wal::OperationUnitId;
use paged_wal::PageChanges;
use paged_wal::PageUpdate;
use paged_wal::WALRecord;
use paged_wal::WriteAheadLog;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tempfile::TempDir;

/// Log random atomic operations and checkpoints, cut the log at every other
/// checkpoint, and reopen it a few times. The log must always read back
/// exactly the records logged after the last cut.
#[test]
fn test_massive_load() -> Result<(), io::Error> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().to_str().unwrap().to_string();

    let config = Arc::new(Config {
        dir: path,
        page_size: Some(256),
        max_segment_size: Some(4 * 1024),
        commit_delay_ms: Some(10),
        ..Default::default()
    });

    let mut rng = StdRng::seed_from_u64(0x5eed);

    // Every record expected to be in the log.
    let mut logged: BTreeMap<LogSequenceNumber, WALRecord> = BTreeMap::new();
    let mut last_checkpoint = None;
    let mut op_id = 0u64;

    for reopen_index in 0..3 {
        let wal = WriteAheadLog::open(config.clone())?;

        assert_eq!(last_checkpoint, wal.last_checkpoint());
        assert_all_records(&wal, &logged)?;

        for i in 0..300u64 {
            match rng.random_range(0..10) {
                0 => {
                    let rec = WALRecord::FuzzyCheckpointStart(CheckpointStart {
                        previous_checkpoint: last_checkpoint,
                        metadata: None,
                    });
                    let lsn = wal.log(&rec)?;
                    logged.insert(lsn, rec);

                    // Keep the previous checkpoint, cut everything before it
                    if let Some(prev) = last_checkpoint {
                        if rng.random_bool(0.5) {
                            wal.cut_till(prev)?;

                            let begin = wal.begin()?;
                            logged.retain(|lsn, _| Some(*lsn) >= begin);
                        }
                    }

                    last_checkpoint = Some(lsn);
                    assert_eq!(last_checkpoint, wal.last_checkpoint());
                }
                1 => {
                    let rec = WALRecord::NonTxOperationPerformed;
                    let lsn = wal.log(&rec)?;
                    logged.insert(lsn, rec);
                }
                _ => {
                    op_id += 1;
                    let op = OperationUnitId(op_id);

                    let updates = rng.random_range(0..5);
                    let mut records = vec![WALRecord::AtomicUnitStart(
                        AtomicUnitStart {
                            operation_unit_id: op,
                            rollback_supported: true,
                            metadata: None,
                        },
                    )];

                    for j in 0..updates {
                        let mut changes = PageChanges::new();
                        let size = rng.random_range(1..700);
                        changes.add(
                            rng.random_range(0..4096),
                            vec![(i % 256) as u8; size],
                        );

                        records.push(WALRecord::UpdatePage(PageUpdate {
                            operation_unit_id: op,
                            file_id: reopen_index,
                            page_index: j,
                            changes,
                        }));
                    }

                    records.push(WALRecord::AtomicUnitEnd(AtomicUnitEnd {
                        operation_unit_id: op,
                        rollback: false,
                        metadata: BTreeMap::new(),
                    }));

                    let mut segments = vec![];
                    for rec in records {
                        let lsn = wal.log(&rec)?;
                        segments.push(lsn.segment());
                        logged.insert(lsn, rec);
                    }

                    // An operation is never split across segments
                    assert!(segments.iter().all(|s| *s == segments[0]));
                }
            }

            if i % 50 == 0 {
                wal.flush()?;
                assert!(wal.flushed_lsn() >= logged.keys().last().copied());

                let k = rng.random_range(0..logged.len());
                if let Some((lsn, rec)) = logged.iter().nth(k) {
                    assert_eq!(Some(rec), wal.read(*lsn)?.as_ref());
                }
            }
        }

        assert_all_records(&wal, &logged)?;
    }

    Ok(())
}

fn assert_all_records(
    wal: &WriteAheadLog,
    logged: &BTreeMap<LogSequenceNumber, WALRecord>,
) -> Result<(), io::Error> {
    let got = wal.iter()?.collect::<Result<Vec<_>, _>>()?;
    let want =
        logged.iter().map(|(k, v)| (*k, v.clone())).collect::<Vec<_>>();

    assert_eq!(want.len(), got.len());
    assert!(want == got, "records read back differ from records logged");

    Ok(())
}
