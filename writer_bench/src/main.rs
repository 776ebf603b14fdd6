use std::error::Error;
use std::io::{self, BufRead};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;

use shmring::{RingConfig, RingWriter};

/// Benchmark record: one cache line carrying a sequence number and the
/// publication timestamp. Must match the reader bench's definition.
#[derive(Clone, Copy)]
#[repr(C)]
struct Sample {
    seq: u64,
    stamp_ns: u64,
    _pad: [u64; 6],
}

const END_MARKER: u64 = u64::MAX;

impl Sample {
    fn new(seq: u64) -> Sample {
        let stamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Sample {
            seq,
            stamp_ns,
            _pad: [0; 6],
        }
    }
}

#[derive(clap::Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmring-writer.toml")]
    config: String,
    /// Number of records to publish before the end marker.
    #[clap(short = 'n', long = "items", default_value_t = 10_000_000)]
    items: u64,
    /// Keep the ring alive after the run so late readers can still drain it.
    #[clap(long = "pause-after-write")]
    pause_after_write: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let opts: Opts = Opts::parse();
    let cfg: RingConfig = confy::load_path(&opts.config)?;
    let mut ring = RingWriter::<Sample>::create(&cfg.name, cfg.capacity, cfg.remove_on_close)?;
    run(&mut ring, &opts)
}

fn run(ring: &mut RingWriter<Sample>, opts: &Opts) -> Result<(), Box<dyn Error>> {
    println!(
        "publishing {} samples of {} bytes through a ring of {} slots",
        opts.items,
        std::mem::size_of::<Sample>(),
        ring.capacity()
    );

    let start = Instant::now();
    for seq in 0..opts.items {
        ring.push_with(|| Sample::new(seq));
        if seq % 1_000_000 == 0 {
            eprint!("\rpublished {seq} samples");
        }
    }
    ring.push_with(|| Sample::new(END_MARKER));
    let duration = start.elapsed();

    let items_sec = opts.items as f64 / duration.as_secs_f64();
    let bytes_sec = items_sec * std::mem::size_of::<Sample>() as f64;
    println!(
        "\nwriter throughput: {:.0} items/sec, {:.0} bytes/sec, total time {:?}",
        items_sec, bytes_sec, duration
    );

    if opts.pause_after_write {
        println!("run finished, press enter to tear the ring down");
        let stdin = io::stdin();
        let _ = stdin.lock().read_line(&mut String::new())?;
    }
    Ok(())
}
