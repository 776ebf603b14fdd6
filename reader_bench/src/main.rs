use std::error::Error;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;

use shmring::{RingConfig, RingReader};

/// Benchmark record layout, shared with the writer bench by convention; the
/// ring header rejects a mismatched size at open time.
#[derive(Clone, Copy)]
#[repr(C)]
struct Sample {
    seq: u64,
    stamp_ns: u64,
    _pad: [u64; 6],
}

const END_MARKER: u64 = u64::MAX;

#[derive(clap::Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmring-reader.toml")]
    config: String,
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let opts: Opts = Opts::parse();
    let cfg: RingConfig = confy::load_path(&opts.config)?;
    let reader = RingReader::<Sample>::open_with_fixup(&cfg.name, cfg.underflow_fixup)?;
    run(&reader)
}

fn run(reader: &RingReader<Sample>) -> Result<(), Box<dyn Error>> {
    let mut delivered = 0u64;
    let mut gaps = 0u64;
    let mut errors = 0u64;
    let mut prev: Option<u64> = None;

    // latency is only meaningful when the reader has caught up: the record
    // was read right after it was published
    let mut latency_sum = 0u64;
    let mut latency_min = u64::MAX;
    let mut latency_items = 0u64;

    let start = Instant::now();
    loop {
        let sample = reader.get();
        reader.advance(1);

        if reader.is_empty() {
            let lat = now_ns().saturating_sub(sample.stamp_ns);
            latency_sum += lat;
            latency_items += 1;
            latency_min = latency_min.min(lat);
        }

        if sample.seq == END_MARKER {
            break;
        }
        delivered += 1;

        if let Some(prev) = prev {
            if sample.seq > prev {
                gaps += sample.seq - prev - 1;
            } else {
                // the sequence must never go backwards
                errors += 1;
            }
        }
        prev = Some(sample.seq);
    }
    let duration = start.elapsed();

    let items_sec = delivered as f64 / duration.as_secs_f64();
    let bytes_sec = items_sec * std::mem::size_of::<Sample>() as f64;
    println!(
        "reader results:\n\
         \x20 delivered      : {delivered}\n\
         \x20 gaps           : {gaps}\n\
         \x20 errors         : {errors}\n\
         \x20 throughput     : {items_sec:.0} items/sec, {bytes_sec:.0} bytes/sec\n\
         \x20 average latency: {} ns\n\
         \x20 min latency    : {} ns",
        if latency_items > 0 { latency_sum / latency_items } else { 0 },
        if latency_items > 0 { latency_min } else { 0 },
    );

    Ok(())
}
