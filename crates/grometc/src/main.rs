//! The GroMEt compiler CLI.
//!
//! Provides the `grometc` command with the following subcommands:
//!
//! - `grometc lower <cast.json>` - Run the pipeline over a CAST document
//!   and write the GroMEt function-network module as JSON
//!
//! Options:
//! - `--output` - Output path for the FN JSON (default: `<stem>--fn.json`
//!   next to the input)
//! - `--pretty` - Pretty-print the emitted JSON
//! - `--source-language` / `--source-language-version` - Source metadata
//!   recorded on literals and imported boxes
//! - `--verbose` - Log one line per pass to stderr
//! - `--json` - Output diagnostics as JSON (one object per line)
//! - `--no-color` - Disable colorized output

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use gromet_cast::CastNode;
use gromet_common::{PipelineError, PipelineErrorKind};
use gromet_passes::PipelineOptions;

#[derive(Parser)]
#[command(name = "grometc", version, about = "The GroMEt compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a CAST JSON document to a GroMEt function network
    Lower {
        /// Path to the CAST JSON document
        path: PathBuf,

        /// Output path for the FN JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the emitted JSON
        #[arg(long)]
        pretty: bool,

        /// Source language recorded in the module's metadata
        #[arg(long = "source-language", default_value = "Python")]
        source_language: String,

        /// Source language version recorded in the module's metadata
        #[arg(long = "source-language-version", default_value = "3.10")]
        source_language_version: String,

        /// Log one line per pass to stderr
        #[arg(long)]
        verbose: bool,

        /// Output diagnostics as JSON (one object per line) instead of human-readable format
        #[arg(long)]
        json: bool,

        /// Disable colorized output
        #[arg(long = "no-color")]
        no_color: bool,
    },
}

/// How diagnostics are rendered on stderr.
struct DiagnosticOptions {
    json: bool,
    color: bool,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Lower {
            path,
            output,
            pretty,
            source_language,
            source_language_version,
            verbose,
            json,
            no_color,
        } => {
            let diag_opts = DiagnosticOptions {
                color: !no_color && !json,
                json,
            };
            let mut options = PipelineOptions::new(path.display().to_string());
            options.source_language = source_language;
            options.source_language_version = source_language_version;
            options.verbose = verbose;

            if let Err(e) = lower(&path, output.as_deref(), pretty, &options, &diag_opts) {
                if diag_opts.json {
                    // In JSON mode, emit the final error as JSON too.
                    let msg = serde_json::json!({
                        "code": "G0001",
                        "severity": "error",
                        "message": e,
                        "file": "",
                        "spans": [],
                        "fix": null
                    });
                    eprintln!("{}", msg);
                } else {
                    eprintln!("error: {}", e);
                }
                process::exit(1);
            }
        }
    }
}

/// Execute the lowering pipeline: read CAST JSON -> run passes -> write FN JSON.
fn lower(
    path: &Path,
    output: Option<&Path>,
    pretty: bool,
    options: &PipelineOptions,
    diag_opts: &DiagnosticOptions,
) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("Input file '{}' does not exist", path.display()));
    }
    if !path.is_file() {
        return Err(format!("'{}' is not a file", path.display()));
    }

    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

    let root: CastNode = match serde_json::from_str(&source) {
        Ok(root) => root,
        Err(e) => {
            report_parse_error(&source, path, &e, diag_opts);
            return Err("Lowering failed due to errors above.".to_string());
        }
    };

    let state = match gromet_passes::run_pipeline(root, options) {
        Ok(state) => state,
        Err(e) => {
            report_pipeline_error(&e, path, diag_opts);
            return Err("Lowering failed due to errors above.".to_string());
        }
    };
    let Some(module) = state.gromet_module else {
        return Err("Pipeline finished without producing a module".to_string());
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&module)
    } else {
        serde_json::to_string(&module)
    }
    .map_err(|e| format!("Failed to serialize the module: {}", e))?;

    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => default_output_path(path),
    };
    std::fs::write(&output_path, rendered)
        .map_err(|e| format!("Failed to write '{}': {}", output_path.display(), e))?;

    eprintln!("  Wrote: {}", output_path.display());

    Ok(())
}

/// The default destination: the input path with `--fn.json` replacing its
/// extension.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module");
    input.with_file_name(format!("{stem}--fn.json"))
}

/// Report a malformed CAST document.
///
/// When `diag_opts.json` is true, outputs one JSON object to stderr.
/// Otherwise renders a labeled span over the offending position in the
/// input file.
fn report_parse_error(
    source: &str,
    path: &Path,
    error: &serde_json::Error,
    diag_opts: &DiagnosticOptions,
) {
    let file_name = path.display().to_string();
    let start = byte_offset(source, error.line(), error.column());
    let end = start + 1;

    if diag_opts.json {
        let json_diag = serde_json::json!({
            "code": "P0001",
            "severity": "error",
            "message": format!("Parse error: {}", error),
            "file": file_name,
            "spans": [{
                "start": start,
                "end": end,
                "label": error.to_string()
            }],
            "fix": null
        });
        eprintln!("{}", json_diag);
    } else {
        use ariadne::{Config, Label, Report, ReportKind, Source};
        let config = if diag_opts.color {
            Config::default()
        } else {
            Config::default().with_color(false)
        };
        let _ = Report::<std::ops::Range<usize>>::build(ReportKind::Error, start..end)
            .with_message("Parse error")
            .with_config(config)
            .with_label(Label::new(start..end).with_message(error.to_string()))
            .finish()
            .eprint(Source::from(source));
    }
}

/// Report a pass failure. A location, when present, names a position in the
/// analyzed source program rather than in the CAST document, so it travels
/// in the message instead of as a span.
fn report_pipeline_error(error: &PipelineError, path: &Path, diag_opts: &DiagnosticOptions) {
    if diag_opts.json {
        let json_diag = serde_json::json!({
            "code": error_code(error),
            "severity": "error",
            "message": error.to_string(),
            "file": path.display().to_string(),
            "spans": [],
            "fix": null
        });
        eprintln!("{}", json_diag);
    } else {
        eprintln!("error: {}", error);
    }
}

fn error_code(error: &PipelineError) -> &'static str {
    match &error.kind {
        PipelineErrorKind::Structural(_) => "L0001",
        PipelineErrorKind::Invariant(_) => "L0002",
        PipelineErrorKind::UnresolvedReference(_) => "L0003",
    }
}

/// Byte offset of a one-based line/column position in `source`.
fn byte_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    let mut remaining = line.saturating_sub(1);
    for l in source.split_inclusive('\n') {
        if remaining == 0 {
            break;
        }
        offset += l.len();
        remaining -= 1;
    }
    (offset + column.saturating_sub(1)).min(source.len())
}
