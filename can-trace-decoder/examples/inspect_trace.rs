//! Standalone trace inspector
//!
//! Decodes a USB-CANmodul binary trace and prints the header block, the first
//! messages and a frequency summary.
//!
//! Usage:
//!   inspect_trace <trace.bin> [--limit <count>] [--diff]

use can_trace_decoder::format::{format_records, render_header};
use can_trace_decoder::{Analysis, Decoder, DecoderConfig, View, ViewKind};
use std::env;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <trace.bin> [--limit <count>] [--diff]", args[0]);
        std::process::exit(1);
    }

    let path = PathBuf::from(&args[1]);
    let mut limit = 20usize;
    let mut differential = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" if i + 1 < args.len() => {
                limit = args[i + 1].parse().unwrap_or(limit);
                i += 2;
            }
            "--diff" => {
                differential = true;
                i += 1;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    let config = DecoderConfig::new().with_differential(differential);
    let trace = match Decoder::new(config.clone()).decode_file(&path, None) {
        Ok(trace) => trace,
        Err(e) => {
            eprintln!("Decode failed ({:04X}h): {}", e.code(), e);
            std::process::exit(1);
        }
    };

    let name = path.display().to_string();
    print!("{}", render_header(&trace, &name));
    println!();

    for line in format_records(&trace, differential).iter().take(limit) {
        println!("{}", line);
    }
    if trace.len() > limit {
        println!("... {} more messages", trace.len() - limit);
    }

    let analysis = Analysis::from_decoded(&trace, &name, &config);
    if let View::Frequency(rows) = analysis.view(ViewKind::Frequency, &analysis.select_all()) {
        println!("\n=== TOP CAN IDS ===");
        for row in rows.iter().take(10) {
            println!(
                "  {:>10}: {:>6} messages ({:.1}%, {:.1} Hz)",
                row.can_id, row.count, row.percentage, row.rate_hz
            );
        }
    }
}
