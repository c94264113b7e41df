//! Command dispatch: loads configuration, runs the pipeline and renders
//! results. Returns the process exit code.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::cli::{Cli, Command, ExtractArgs, ScanArgs};
use crate::config::Config;
use crate::errors::{EXIT_ERROR, EXIT_SUCCESS, GleanError};
use crate::output::{Formatter, print_error};
use crate::pipeline::{BatchReport, Pipeline};
use crate::walker::Walker;

pub fn dispatch(cli: Cli) -> Result<i32, GleanError> {
    match cli.command {
        Command::Extract(args) => run_extract(args, cli.json),
        Command::Scan(args) => run_scan(args, cli.json),
    }
}

fn wants_json(flag: bool, config: &Config) -> bool {
    flag || config.output.default_format == "json"
}

fn walk(root: &Path, config: &Config) -> Result<Vec<PathBuf>, GleanError> {
    let paths = Walker::new(root)
        .exclude(&config.ignore.patterns)
        .collect_paths()
        .with_context(|| format!("invalid ignore pattern while walking {}", root.display()))?;
    Ok(paths)
}

fn run_extract(args: ExtractArgs, json_flag: bool) -> Result<i32, GleanError> {
    let cwd = std::env::current_dir()?;
    let config = Config::load(Some(&cwd))?;
    let json = wants_json(json_flag, &config);

    // Directories expand to their supported sources; files are taken as
    // given so unsupported ones are reported rather than silently dropped.
    let mut paths = Vec::new();
    for path in &args.paths {
        if path.is_dir() {
            paths.extend(walk(path, &config)?);
        } else {
            paths.push(path.clone());
        }
    }

    let pipeline = Pipeline::new(&config)?;
    let report = pipeline.extract_paths(&paths);
    pipeline.close();

    let stdout = std::io::stdout();
    let mut fmt = Formatter::new(stdout.lock(), json);
    for result in &report.results {
        fmt.format_file(result, args.exported)?;
    }
    report_failures(&mut fmt, &report, json)?;
    Ok(exit_code(&report))
}

fn run_scan(args: ScanArgs, json_flag: bool) -> Result<i32, GleanError> {
    let root = args.path;
    if !root.is_dir() {
        return Err(GleanError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }
    let config = Config::load(Some(&root))?;
    let json = wants_json(json_flag, &config);
    let paths = walk(&root, &config)?;

    let pipeline = Pipeline::new(&config)?;
    let report = pipeline.extract_paths(&paths);
    pipeline.close();

    let stdout = std::io::stdout();
    let mut fmt = Formatter::new(stdout.lock(), json);
    report_failures(&mut fmt, &report, json)?;
    fmt.format_scan_summary(&root.display().to_string(), &report.stats)?;
    Ok(exit_code(&report))
}

fn report_failures<W: Write>(
    fmt: &mut Formatter<W>,
    report: &BatchReport,
    json: bool,
) -> std::io::Result<()> {
    for failure in &report.failures {
        if json {
            fmt.format_failure(failure)?;
        } else {
            print_error(&format!("{}: {}", failure.path, failure.error));
        }
    }
    Ok(())
}

fn exit_code(report: &BatchReport) -> i32 {
    if report.failures.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_ERROR
    }
}
