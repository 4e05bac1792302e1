//! CAN Trace Converter CLI Application
//!
//! Command-line front end for the can-trace-decoder library:
//! - `convert` turns a binary USB-CANmodul trace into the text trace
//! - `analyze` filters a trace and prints summaries, timelines and frequencies

use anyhow::{bail, Context, Result};
use can_trace_decoder::{
    Analysis, DecodeProgress, DecodedTrace, Decoder, DecoderConfig, DecoderError, FilterCriteria,
    FunctionCode, ViewKind,
};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

mod config;
mod report;

use config::AppConfig;
use report::ReportFormat;

/// CAN Trace Converter - Decode and analyze USB-CANmodul traces
#[derive(Parser, Debug)]
#[command(name = "can-trace-cli")]
#[command(about = "Decode and analyze USB-CANmodul binary CAN traces", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a binary trace into a text trace
    Convert(ConvertArgs),
    /// Filter a trace and print one of the analysis views
    Analyze(AnalyzeArgs),
}

#[derive(ClapArgs, Debug)]
struct ConvertArgs {
    /// Binary trace file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Text trace to write (default: INPUT with extension .txt)
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Print the time since the previous message instead of absolute times
    #[arg(long)]
    diff: bool,

    /// Write the text trace to stdout instead of a file
    #[arg(long)]
    stdout: bool,
}

#[derive(ClapArgs, Debug)]
struct AnalyzeArgs {
    /// Text trace, or binary trace with --binary
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Decode INPUT as a binary trace instead of parsing text
    #[arg(long)]
    binary: bool,

    /// Differential timestamps (binary input only)
    #[arg(long)]
    diff: bool,

    /// View to print: all, unique, timeline, frequency, stats
    #[arg(long, value_name = "VIEW")]
    view: Option<ViewKind>,

    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Timeline bucket width in milliseconds
    #[arg(long, value_name = "MS")]
    bucket_width: Option<i64>,

    /// Write the filtered messages as a text trace
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(ClapArgs, Debug, Default)]
struct FilterArgs {
    /// Direction (RX or TX)
    #[arg(long)]
    direction: Option<String>,

    /// Substring of the CAN-ID column
    #[arg(long)]
    can_id: Option<String>,

    /// Exact DLC
    #[arg(long)]
    dlc: Option<String>,

    /// Earliest time (inclusive)
    #[arg(long, value_name = "MS")]
    time_from: Option<i64>,

    /// Latest time (inclusive)
    #[arg(long, value_name = "MS")]
    time_to: Option<i64>,

    /// Substring of the data column
    #[arg(long)]
    data: Option<String>,

    /// Substring of the source id part of the CAN ID
    #[arg(long)]
    source_id: Option<String>,

    /// Payload byte match, e.g. `0=A2`
    #[arg(long, value_name = "INDEX=PATTERN", value_parser = parse_function_code)]
    function_code: Option<FunctionCode>,
}

impl FilterArgs {
    /// Command-line predicates override the ones from the config file
    fn merge_into(self, mut criteria: FilterCriteria) -> FilterCriteria {
        criteria.direction = self.direction.or(criteria.direction);
        criteria.can_id = self.can_id.or(criteria.can_id);
        criteria.dlc = self.dlc.or(criteria.dlc);
        criteria.time_from = self.time_from.or(criteria.time_from);
        criteria.time_to = self.time_to.or(criteria.time_to);
        criteria.data = self.data.or(criteria.data);
        criteria.source_id = self.source_id.or(criteria.source_id);
        criteria.function_code = self.function_code.or(criteria.function_code);
        criteria
    }
}

fn parse_function_code(value: &str) -> std::result::Result<FunctionCode, String> {
    let (index, pattern) = value
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=PATTERN, got '{}'", value))?;
    let byte_index = index
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid byte index '{}': {}", index, e))?;
    Ok(FunctionCode {
        byte_index,
        pattern: pattern.trim().to_string(),
    })
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("CAN Trace Converter CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using decoder library v{}", can_trace_decoder::VERSION);

    let result = match args.command {
        Command::Convert(convert) => run_convert(convert),
        Command::Analyze(analyze) => run_analyze(analyze),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Decode on a worker thread while this thread reports progress
fn decode_with_progress(path: &Path, config: DecoderConfig) -> Result<DecodedTrace, DecoderError> {
    let (tx, rx) = mpsc::channel();
    let decoder = Decoder::new(config);
    let input = path.to_path_buf();

    let worker = thread::spawn(move || decoder.decode_file(&input, Some(&tx)));

    for progress in rx {
        match progress {
            DecodeProgress::Status(message) => log::info!("{}", message),
            DecodeProgress::Records(count) => log::debug!("{} messages processed", count),
        }
    }

    worker
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

fn decode_failure_message(error: &DecoderError) -> String {
    format!("Conversion UNSUCCESSFUL! Error code = {:04X}h", error.code())
}

fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("txt")
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    if !args.stdout && output == args.input {
        bail!("Output file {:?} would overwrite the input", output);
    }

    match convert(&args, &output) {
        Ok(count) => {
            log::info!("Converted {} messages", count);
            let status = "Conversion successful.";
            if args.stdout {
                eprintln!("{}", status);
            } else {
                println!("{}", status);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", decode_failure_message(&e));
            Err(e.into())
        }
    }
}

/// Decode, render and write the text trace, returning the message count
fn convert(args: &ConvertArgs, output: &Path) -> Result<usize, DecoderError> {
    let config = DecoderConfig::new().with_differential(args.diff);
    let trace = decode_with_progress(&args.input, config.clone())?;
    let input_name = args.input.display().to_string();
    let text = can_trace_decoder::format::render_trace(&trace, &input_name, &config);

    let write_failed = |source: io::Error| DecoderError::Io {
        records_read: trace.len(),
        source,
    };

    if args.stdout {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes()).map_err(write_failed)?;
        stdout.flush().map_err(write_failed)?;
    } else {
        log::info!("Writing text trace to {:?}", output);
        let mut file = fs::File::create(output).map_err(|source| DecoderError::OutputCreate {
            path: output.display().to_string(),
            source,
        })?;
        file.write_all(text.as_bytes()).map_err(write_failed)?;
    }

    Ok(trace.len())
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let view = args.view.unwrap_or(config.analysis.view);
    let bucket_width = args.bucket_width.unwrap_or(config.analysis.bucket_width);
    if bucket_width <= 0 {
        bail!("Bucket width must be positive, got {}", bucket_width);
    }
    let criteria = args.filter.merge_into(config.filter.clone());

    let loaded = if args.binary {
        let decoder_config =
            DecoderConfig::new().with_differential(args.diff || config.analysis.differential);
        let trace = decode_with_progress(&args.input, decoder_config.clone())
            .map_err(|e| {
                eprintln!("{}", decode_failure_message(&e));
                e
            })
            .with_context(|| format!("Failed to decode {:?}", args.input))?;
        Analysis::from_decoded(&trace, &args.input.display().to_string(), &decoder_config)
    } else {
        let text = fs::read_to_string(&args.input)
            .with_context(|| format!("Failed to read text trace: {:?}", args.input))?;
        Analysis::from_text(&text)
    };
    let analysis = loaded.with_bucket_width(bucket_width);

    if analysis.dropped_lines() > 0 {
        log::info!("{} lines skipped while parsing", analysis.dropped_lines());
    }

    let selection = analysis.filter_with(&criteria, &config.analysis.source_id)?;
    log::info!(
        "Showing {} of {} messages ({} view)",
        selection.len(),
        analysis.records().len(),
        view
    );

    let rendered = report::render(&analysis.view(view, &selection), args.format)?;
    print!("{}", rendered);
    if args.format == ReportFormat::Json {
        println!();
    }

    if let Some(path) = &args.export {
        let exported = analysis.export(&selection, chrono::Local::now().naive_local());
        fs::write(path, exported)
            .with_context(|| format!("Failed to write export file: {:?}", path))?;
        log::info!("Exported {} messages to {:?}", selection.len(), path);
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_convert_arguments() {
        let args = Args::parse_from(["can-trace-cli", "convert", "trace.bin", "--diff"]);
        match args.command {
            Command::Convert(convert) => {
                assert_eq!(convert.input, PathBuf::from("trace.bin"));
                assert!(convert.output.is_none());
                assert!(convert.diff);
                assert!(!convert.stdout);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_decode_failure_message() {
        let err = DecoderError::InvalidFormat(0x1234_5678);
        assert_eq!(
            decode_failure_message(&err),
            "Conversion UNSUCCESSFUL! Error code = 1002h"
        );
    }

    #[test]
    fn test_analyze_binary_failure_keeps_error_code() {
        let args = Args::parse_from([
            "can-trace-cli",
            "analyze",
            "/nonexistent/trace.bin",
            "--binary",
        ]);
        let Command::Analyze(analyze) = args.command else {
            panic!("expected analyze command");
        };
        let err = run_analyze(analyze).unwrap_err();
        let code = err.downcast_ref::<DecoderError>().map(DecoderError::code);
        assert_eq!(code, Some(0x1000));
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("logs/trace.bin")),
            PathBuf::from("logs/trace.txt")
        );
        assert_eq!(default_output_path(Path::new("trace")), PathBuf::from("trace.txt"));
    }

    #[test]
    fn test_analyze_arguments() {
        let args = Args::parse_from([
            "can-trace-cli",
            "-v",
            "analyze",
            "trace.txt",
            "--view",
            "timeline",
            "--format",
            "json",
            "--can-id",
            "18ff",
            "--function-code",
            "1=a2",
        ]);
        assert_eq!(args.verbose, 1);
        match args.command {
            Command::Analyze(analyze) => {
                assert_eq!(analyze.view, Some(ViewKind::Timeline));
                assert_eq!(analyze.format, ReportFormat::Json);
                assert_eq!(analyze.filter.can_id.as_deref(), Some("18ff"));
                let fc = analyze.filter.function_code.unwrap();
                assert_eq!((fc.byte_index, fc.pattern.as_str()), (1, "a2"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_code_errors() {
        assert!(parse_function_code("A2").is_err());
        assert!(parse_function_code("x=A2").is_err());
    }

    #[test]
    fn test_flags_override_config_filter() {
        let from_config = FilterCriteria::new().with_direction("RX").with_can_id("123");
        let flags = FilterArgs {
            can_id: Some("456".to_string()),
            ..FilterArgs::default()
        };
        let merged = flags.merge_into(from_config);
        assert_eq!(merged.direction.as_deref(), Some("RX"));
        assert_eq!(merged.can_id.as_deref(), Some("456"));
    }

    #[test]
    fn test_convert_missing_input_reports_code() {
        let args = ConvertArgs {
            input: PathBuf::from("/nonexistent/trace.bin"),
            output: None,
            diff: false,
            stdout: true,
        };
        let err = convert(&args, Path::new("/nonexistent/trace.txt")).unwrap_err();
        assert_eq!(err.code(), 0x1000);
    }

    #[test]
    fn test_convert_writes_text_trace() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("trace.bin");
        let output = dir.path().join("trace.txt");

        let mut header = can_trace_decoder::TraceHeader {
            signature: can_trace_decoder::types::TRACE_SIGNATURE,
            ..Default::default()
        };
        header.channels[0].is_active = true;
        header.message_offset = can_trace_decoder::header::encoded_len(&header) as u32;
        let records = vec![can_trace_decoder::CanRecord {
            id: 0x123,
            flags: can_trace_decoder::FrameFlags(0),
            dlc: 2,
            data: [1, 2, 0, 0, 0, 0, 0, 0],
            time: 10,
        }];
        let bytes = can_trace_decoder::decoder::encode_trace(&header, &records).unwrap();
        fs::write(&input, bytes).unwrap();

        let args = ConvertArgs {
            input: input.clone(),
            output: Some(output.clone()),
            diff: false,
            stdout: false,
        };
        assert_eq!(convert(&args, &output).unwrap(), 1);

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains("RX: 000000010       123h (2) 01 02 -- -- -- -- -- --\n"));
        assert!(text.contains("Total number of CAN messages: 1"));
    }
}
