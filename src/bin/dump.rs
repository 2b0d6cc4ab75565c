use std::io;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use paged_wal::Config;
use paged_wal::Dump;
use paged_wal::DumpApi;

#[derive(Clone, Debug, PartialEq, Eq, clap::Parser)]
#[clap(about = "dump the records of a paged WAL directory", author)]
pub struct Args {
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// File name prefix of the WAL files: `<STORAGE_NAME>.<order>.wal`
    #[arg(long, default_value = "storage")]
    storage_name: String,

    /// Page size the WAL was written with
    #[arg(long)]
    page_size: Option<usize>,
}

fn main() -> Result<(), io::Error> {
    let args = Args::parse();

    let dir = args.path.to_str().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path is not valid UTF-8: {:?}", args.path),
        )
    })?;

    let config = Config {
        dir: dir.to_string(),
        storage_name: Some(args.storage_name),
        page_size: args.page_size,
        ..Default::default()
    };
    config.validate()?;

    Dump::new(Arc::new(config)).write(stdout().lock())
}
