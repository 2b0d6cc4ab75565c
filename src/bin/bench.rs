use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use paged_wal::api::log_writer::LogWriter;
use paged_wal::Config;
use paged_wal::OperationUnitId;
use paged_wal::PageChanges;
use paged_wal::PageUpdate;
use paged_wal::WALRecord;
use paged_wal::WriteAheadLog;

#[derive(Clone, Debug, PartialEq, Eq, clap::Parser)]
#[clap(about = "append throughput of a paged WAL", author)]
pub struct Args {
    /// Directory to create the WAL in
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Number of atomic operations to log
    #[arg(long, default_value_t = 100_000)]
    n: u64,

    /// Number of page updates in each operation
    #[arg(long, default_value_t = 4)]
    updates: u64,

    /// Bytes changed by each page update
    #[arg(long, default_value_t = 100)]
    payload_size: usize,

    /// Flush after every operation
    #[arg(long)]
    flush: bool,

    /// Print the throughput every `step` operations
    #[arg(long, default_value_t = 10_000)]
    step: u64,
}

fn main() -> Result<(), io::Error> {
    let args = Args::parse();

    fs::create_dir_all(&args.path)?;
    let path = args.path.to_string_lossy().to_string();

    println!("WAL dir: {}", path);

    let config = Config {
        dir: path,
        ..Default::default()
    };
    let wal = WriteAheadLog::open(Arc::new(config))?;

    let step = args.step.max(1);
    let begin = Instant::now();
    let mut start = Instant::now();

    for i in 0..args.n {
        let op = OperationUnitId::generate();
        wal.log_atomic_operation_start_record(true, op)?;

        for j in 0..args.updates {
            let mut changes = PageChanges::new();
            changes.add(0, vec![(i % 256) as u8; args.payload_size]);

            let record = WALRecord::UpdatePage(PageUpdate {
                operation_unit_id: op,
                file_id: 1,
                page_index: i * args.updates + j,
                changes,
            });
            wal.log(&record)?;
        }

        wal.log_atomic_operation_end_record(op, false, Default::default())?;

        if args.flush {
            wal.flush()?;
        }

        if i > 0 && i % step == 0 {
            let elapsed = start.elapsed();
            println!(
                "ops: {}, elapsed: {:?}, {:?}/op, {} ops/ms",
                i,
                elapsed,
                elapsed / (step as u32),
                step / (elapsed.as_millis() as u64 + 1)
            );
            start = Instant::now();
        }
    }

    wal.flush()?;

    println!("{}", wal.stat());
    println!(
        "done: {} ops in {:?}, log size: {}",
        args.n,
        begin.elapsed(),
        wal.size()
    );
    Ok(())
}
