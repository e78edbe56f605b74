use clap::Parser;
use log::{error, info};

use pbr::{timestamp_ms, Config, Pipeline, Recorder, SampleBuffer, Source};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(name = "pbr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Passive bistatic radar processor", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long)]
    config: PathBuf,
}

fn run(args: &Args) -> pbr::Result<()> {
    let config = Config::from_file(&args.config)?;
    let fs = config.capture.fs;
    info!(
        "fs {} Hz, fc {} Hz, {} samples per interval",
        fs,
        config.capture.fc,
        config.n_samples()
    );

    let reference = Arc::new(SampleBuffer::new(config.buffer_samples())?);
    let surveillance = Arc::new(SampleBuffer::new(config.buffer_samples())?);
    let running = Arc::new(AtomicBool::new(true));

    let mut pipeline = Pipeline::new(&config)?;
    let mut recorder = Recorder::new(&config.save, fs, &timestamp_ms().to_string())?;
    let source = Source::from_config(&config)?;

    let capture = {
        let (r, s, run) = (reference.clone(), surveillance.clone(), running.clone());
        thread::Builder::new()
            .name("capture".into())
            .spawn(move || source.run(r, s, fs, run))?
    };

    let processed = pipeline.run(&reference, &surveillance, &running, fs, |interval| {
        recorder.record(interval)
    });
    running.store(false, Ordering::Release);

    let captured = match capture.join() {
        Ok(result) => result,
        Err(_) => {
            error!("capture thread panicked");
            Ok(())
        }
    };
    processed?;
    captured
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
