use std::error::Error;

use clap::Parser;

use shmring::{RingConfig, RingReader};

#[derive(clap::Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmring-reader.toml")]
    config: String,
    /// Keep following the stream instead of stopping once the ring is
    /// observed empty.
    #[clap(long)]
    follow: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let opts: Opts = Opts::parse();
    let cfg: RingConfig = confy::load_path(&opts.config)?;
    let reader = RingReader::<u64>::open_with_fixup(&cfg.name, cfg.underflow_fixup)?;
    run(&reader, opts.follow)
}

/// Dump the observable stream as `position <TAB> value` lines.
fn run(reader: &RingReader<u64>, follow: bool) -> Result<(), Box<dyn Error>> {
    let mut position = 0usize;
    loop {
        for value in reader {
            println!("{position}\t{value}");
            position += 1;
        }
        if !follow {
            return Ok(());
        }
        // blocks until the writer publishes again
        let value = reader.get();
        reader.advance(1);
        println!("{position}\t{value}");
        position += 1;
    }
}
