use std::error::Error;
use std::thread;
use std::time::Duration;

use clap::Parser;

use shmring::{RingConfig, RingWriter};

#[derive(clap::Parser)]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmring-writer.toml")]
    config: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let opts: Opts = Opts::parse();
    let cfg: RingConfig = confy::load_path(&opts.config)?;
    let mut ring = RingWriter::<u64>::create(&cfg.name, cfg.capacity, cfg.remove_on_close)?;
    run(&mut ring)
}

fn run(ring: &mut RingWriter<u64>) -> Result<(), Box<dyn Error>> {
    for value in 0..=20 {
        ring.push(value);
        println!("pushed {value}, ring holds {}", ring.len());
        thread::sleep(Duration::from_millis(500));
    }
    Ok(())
}
