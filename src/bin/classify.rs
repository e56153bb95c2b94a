//! Thin driver over `DroneAcousticCore::classify`. Reads a JSON request
//! (samples + sample_rate, audio decode is the caller's job) from a file
//! path argument or stdin, prints a `ClassificationSummary` as JSON.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use drone_acoustic_core::{ClassifyInput, CoreConfig, DroneAcousticCore};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RequestBody {
    samples: Vec<f32>,
    sample_rate: u32,
    #[serde(default)]
    preprocessed: bool,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    recording_path: Option<String>,
}

fn usage() -> ! {
    eprintln!("usage: drone-classify [<request.json>]");
    eprintln!("  reads a JSON {{samples, sample_rate}} request from the given file, or stdin if omitted");
    process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        usage();
    }

    let body = if let Some(path) = args.get(1) {
        match fs::read_to_string(path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("error: failed to read {path}: {e}");
                process::exit(1);
            }
        }
    } else {
        let mut buf = String::new();
        if let Err(e) = io::stdin().read_to_string(&mut buf) {
            eprintln!("error: failed to read stdin: {e}");
            process::exit(1);
        }
        buf
    };

    let request: RequestBody = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: invalid request JSON: {e}");
            process::exit(1);
        }
    };

    let config = CoreConfig::from_env();
    let core = match DroneAcousticCore::init(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to initialize classification core: {e}");
            process::exit(1);
        }
    };

    let input = ClassifyInput {
        samples: request.samples,
        sample_rate: request.sample_rate,
        preprocessed: request.preprocessed,
        latitude: request.latitude,
        longitude: request.longitude,
        persist: false,
        recording_path: request.recording_path,
    };

    match core.classify(input) {
        Ok(summary) => println!("{}", serde_json::to_string_pretty(&summary).unwrap()),
        Err(e) => {
            eprintln!("error: classification failed: {e}");
            process::exit(1);
        }
    }
}
