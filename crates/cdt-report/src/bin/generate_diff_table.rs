#![forbid(unsafe_code)]

use cdt_report::table::render_table;
use cdt_report::{
    DiffReport, ReportConfig, default_report_spec, run_report, set_evidence_log_path,
    write_diff_report,
};
use std::path::PathBuf;

fn main() {
    if let Err(err) = run() {
        eprintln!("generate_diff_table failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut config = ReportConfig::default_paths();
    let mut report_path: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tool" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--tool requires a value".to_string())?;
                config.diff_tool = PathBuf::from(value);
            }
            "--results-root" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--results-root requires a value".to_string())?;
                config.results_root = PathBuf::from(value);
            }
            "--report-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--report-path requires a value".to_string())?;
                report_path = Some(PathBuf::from(value));
            }
            "--log-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--log-path requires a value".to_string())?;
                set_evidence_log_path(Some(PathBuf::from(value)));
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p cdt-report --bin generate_diff_table -- \
                     [--tool <path>] [--results-root <path>] [--report-path <path>] [--log-path <path>]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let spec = default_report_spec();
    let suites = run_report(&config, &spec).map_err(|err| err.to_string())?;

    // The table is the report's contract with stdout; notices go to stderr.
    print!("{}", render_table(&suites));

    if let Some(path) = report_path {
        let report = DiffReport::new(&config, suites);
        write_diff_report(&path, &report)?;
        eprintln!("wrote {}", path.display());
    }

    Ok(())
}
