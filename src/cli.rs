use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// glean - symbol, module and type extraction for TypeScript and JavaScript
#[derive(Parser, Debug)]
#[command(name = "glean", version, about)]
pub struct Cli {
    /// Output results as JSON Lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract symbols, imports, exports and types from files
    Extract(ExtractArgs),

    /// Extract a whole directory and print a summary
    Scan(ScanArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    /// Files or directories to extract
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Only list exported symbols
    #[arg(long)]
    pub exported: bool,
}

#[derive(clap::Args, Debug)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_requires_paths() {
        assert!(Cli::try_parse_from(["glean", "extract"]).is_err());
    }

    #[test]
    fn global_json_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["glean", "extract", "a.ts", "b.js", "--json", "--exported"])
            .unwrap();
        assert!(cli.json);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.paths, vec![PathBuf::from("a.ts"), PathBuf::from("b.js")]);
        assert!(args.exported);
    }

    #[test]
    fn scan_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["glean", "scan"]).unwrap();
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.path, PathBuf::from("."));
        assert!(!cli.json);
    }
}
