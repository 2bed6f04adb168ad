//! flowpdf – command-line event stream → PDF renderer.
//!
//! Usage:
//!   flowpdf <events.json> [output.pdf] [--config cfg.json] [--landscape] [--title "My Report"]
//!
//! If `output.pdf` is omitted the PDF is written next to the input file with
//! the same stem (e.g. `report.json` → `report.pdf`).

use std::{env, fs, path::PathBuf, process};

use flowpdf::layout_config::LayoutConfig;
use flowpdf::pipeline::{generate_pdf_with_warnings, parse_events};
use flowpdf::units::PageOrientation;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut landscape = false;
    let mut title: Option<String> = None;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--landscape" | "-l" => landscape = true,
            "--title" | "-t" => match iter.next() {
                Some(v) => title = Some(v.clone()),
                None => {
                    eprintln!("Error: --title needs a value.");
                    process::exit(1);
                }
            },
            "--config" | "-c" => match iter.next() {
                Some(v) => config_path = Some(PathBuf::from(v)),
                None => {
                    eprintln!("Error: --config needs a path.");
                    process::exit(1);
                }
            },
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let output = output_path.unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension("pdf");
        o
    });

    let mut config = match config_path {
        Some(path) => {
            let json = match fs::read_to_string(&path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error reading '{}': {e}", path.display());
                    process::exit(1);
                }
            };
            match LayoutConfig::from_json(&json) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error in config '{}': {e}", path.display());
                    process::exit(1);
                }
            }
        }
        None => LayoutConfig::default(),
    };
    if landscape {
        config.orientation = PageOrientation::Landscape;
    }
    if title.is_some() {
        config.metadata.title = title;
    } else if config.metadata.title.is_none() {
        // Default title: stem of the input filename.
        config.metadata.title = input.file_stem().and_then(|s| s.to_str()).map(str::to_string);
    }

    let json = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };
    let events = match parse_events(&json) {
        Ok(ev) => ev,
        Err(e) => {
            eprintln!("Error parsing events in '{}': {e}", input.display());
            process::exit(1);
        }
    };

    match generate_pdf_with_warnings(&events, &config) {
        Ok((bytes, warnings)) => {
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        eprintln!("Error creating output directory: {e}");
                        process::exit(1);
                    }
                }
            }
            if let Err(e) = fs::write(&output, &bytes) {
                eprintln!("Error writing '{}': {e}", output.display());
                process::exit(1);
            }
            for w in &warnings {
                eprintln!("warning: {w}");
            }
            eprintln!(
                "Wrote '{}' ({} bytes, {} warning{})",
                output.display(),
                bytes.len(),
                warnings.len(),
                if warnings.len() == 1 { "" } else { "s" }
            );
        }
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("flowpdf – render a JSON event stream to PDF");
    eprintln!();
    eprintln!("Usage:");
    eprintln!(
        "  {prog} <events.json> [output.pdf] [--config cfg.json] [--landscape] [--title \"My Report\"]"
    );
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <events.json>  JSON array of drawing events");
    eprintln!("  [output.pdf]   Output path  (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --config, -c   Layout configuration as JSON (missing fields use defaults)");
    eprintln!("  --title, -t    Document title in PDF metadata (default: input filename stem)");
    eprintln!("  --landscape    Use landscape page orientation");
    eprintln!("  --help         Print this message");
}
