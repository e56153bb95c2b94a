//! Thin driver over `DroneAcousticCore::ingest`. Reads a JSON request
//! (samples + sample_rate + label, plus optional metadata) and prints the
//! stored `Prototype` with updated store stats.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use drone_acoustic_core::{CoreConfig, DroneAcousticCore, IngestRequest};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct RequestBody {
    samples: Vec<f32>,
    sample_rate: u32,
    label: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Serialize)]
struct IngestResponse {
    id: String,
    label: String,
    category: String,
    store_count: usize,
}

fn usage() -> ! {
    eprintln!("usage: drone-ingest [<request.json>]");
    eprintln!("  reads a JSON {{samples, sample_rate, label, ...}} request from the given file, or stdin if omitted");
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

    let outcome = core.ingest(IngestRequest {
        samples: request.samples,
        sample_rate: request.sample_rate,
        label: request.label,
        category: request.category,
        description: request.description,
        source: request.source,
        metadata: request.metadata,
    });

    match outcome {
        Ok(outcome) => {
            let response = IngestResponse {
                id: outcome.prototype.id,
                label: outcome.prototype.label,
                category: outcome.prototype.category,
                store_count: outcome.stats.count,
            };
            println!("{}", serde_json::to_string_pretty(&response).unwrap());
        }
        Err(e) => {
            eprintln!("error: ingest failed: {e}");
            process::exit(1);
        }
    }
}
