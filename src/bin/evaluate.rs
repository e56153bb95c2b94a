//! Thin driver that batch-classifies a JSON array of labelled test cases
//! against the configured prototype store and reports accuracy.

use std::env;
use std::fs;
use std::process;

use drone_acoustic_core::{ClassifyInput, CoreConfig, DroneAcousticCore};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TestCase {
    samples: Vec<f32>,
    sample_rate: u32,
    expected_label: String,
}

fn usage() -> ! {
    eprintln!("usage: drone-evaluate <test_cases.json>");
    eprintln!("  test_cases.json: JSON array of {{samples, sample_rate, expected_label}}");
    process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else { usage() };

    let body = match fs::read_to_string(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: failed to read {path}: {e}");
            process::exit(1);
        }
    };

    let cases: Vec<TestCase> = match serde_json::from_str(&body) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: invalid test case JSON: {e}");
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

    let mut correct = 0usize;
    let mut total = 0usize;

    for case in cases {
        total += 1;
        let input = ClassifyInput {
            samples: case.samples,
            sample_rate: case.sample_rate,
            ..Default::default()
        };
        match core.classify(input) {
            Ok(summary) => {
                let predicted = summary.predictions.first().map(|p| p.label.as_str()).unwrap_or("none");
                let hit = predicted == case.expected_label;
                if hit {
                    correct += 1;
                }
                println!(
                    "expected={} predicted={} is_drone={} hit={}",
                    case.expected_label, predicted, summary.is_drone, hit
                );
            }
            Err(e) => {
                eprintln!("error: classification failed for a case: {e}");
            }
        }
    }

    let accuracy = if total > 0 { correct as f64 / total as f64 } else { 0.0 };
    println!("accuracy: {correct}/{total} ({:.1}%)", accuracy * 100.0);
}
