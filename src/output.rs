//! Output formatting: grep-compatible (default) and JSON Lines (`--json`).
//!
//! All result data flows through a [`Formatter`] which writes to an
//! arbitrary [`std::io::Write`] destination (typically stdout).
//! Hints and errors always go to stderr via [`print_hint`] and [`print_error`].

use std::io::Write;

use serde::Serialize;

use crate::pipeline::{BatchStats, FileFailure};
use crate::types::{ExportInfo, ImportInfo, PerFileResult, Symbol, SymbolKind};

/// Render a symbol as a one-line signature.
///
/// Callables show their parameter list (with types where annotated) and
/// return type; everything else shows kind and qualified name only.
pub fn signature(sym: &Symbol) -> String {
    let mut out = String::new();
    for modifier in &sym.modifiers {
        out.push_str(modifier.as_str());
        out.push(' ');
    }
    out.push_str(sym.kind.as_str());
    out.push(' ');
    out.push_str(&sym.fqn);

    if matches!(sym.kind, SymbolKind::Function | SymbolKind::Method) {
        let params: Vec<String> = sym
            .parameters
            .iter()
            .zip(&sym.parameter_types)
            .map(|(name, ty)| {
                if ty.is_empty() {
                    name.clone()
                } else {
                    format!("{name}: {ty}")
                }
            })
            .collect();
        out.push('(');
        out.push_str(&params.join(", "));
        out.push(')');
    }
    if !sym.return_type.is_empty() {
        out.push_str(": ");
        out.push_str(&sym.return_type);
    }
    out
}

fn import_line(import: &ImportInfo) -> String {
    let names: Vec<String> = import
        .names
        .iter()
        .map(|(local, imported)| {
            if local == imported {
                local.clone()
            } else {
                format!("{imported} as {local}")
            }
        })
        .collect();
    let mut line = format!("import {} {}", import.form.as_str(), import.source);
    if !names.is_empty() {
        line.push_str(&format!(" {{{}}}", names.join(", ")));
    }
    if let Some(resolved) = &import.resolved_path {
        line.push_str(&format!(" -> {resolved}"));
    }
    line
}

fn export_line(export: &ExportInfo) -> String {
    let names: Vec<String> = export
        .names
        .iter()
        .map(|(name, kind)| match export.aliases.get(name) {
            Some(local) => format!("{local} as {name} ({kind})"),
            None => format!("{name} ({kind})"),
        })
        .collect();
    let mut line = format!("export {} {{{}}}", export.form.as_str(), names.join(", "));
    if let Some(source) = &export.source {
        line.push_str(&format!(" from {source}"));
    }
    if export.commonjs {
        line.push_str(" [commonjs]");
    }
    line
}

/// Output formatter that can render results in either grep-compatible text
/// or JSON Lines (one JSON object per line).
pub struct Formatter<W: Write> {
    writer: W,
    json: bool,
}

impl<W: Write> Formatter<W> {
    /// * `writer` - The destination for output (e.g. `std::io::stdout()`).
    /// * `json`   - When `true`, emit JSON Lines; otherwise, emit grep-style text.
    pub fn new(writer: W, json: bool) -> Self {
        Self { writer, json }
    }

    fn write_json<T: Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        let line = serde_json::to_string(value).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    /// Format everything extracted from one file.
    ///
    /// With `exported_only`, unexported symbols are left out.
    pub fn format_file(&mut self, result: &PerFileResult, exported_only: bool) -> std::io::Result<()> {
        if self.json {
            if exported_only {
                let mut filtered = result.clone();
                filtered.symbols.retain(|s| s.is_exported);
                return self.write_json(&filtered);
            }
            return self.write_json(result);
        }

        // file:line:  signature
        for sym in result.symbols.iter().filter(|s| !exported_only || s.is_exported) {
            let marker = if sym.is_exported { "export " } else { "" };
            writeln!(
                self.writer,
                "{}:{}:  {}{}",
                result.path,
                sym.location.start_line,
                marker,
                signature(sym)
            )?;
        }
        for import in &result.imports {
            writeln!(
                self.writer,
                "{}:{}:  {}",
                result.path,
                import.location.start_line,
                import_line(import)
            )?;
        }
        for export in &result.exports {
            writeln!(
                self.writer,
                "{}:{}:  {}",
                result.path,
                export.location.start_line,
                export_line(export)
            )?;
        }
        for (binding, ty) in &result.types {
            writeln!(self.writer, "{}:  type {binding}: {ty}", result.path)?;
        }
        Ok(())
    }

    /// Format a file the batch could not extract. JSON mode only; in grep
    /// mode failures are reported on stderr.
    pub fn format_failure(&mut self, failure: &FileFailure) -> std::io::Result<()> {
        if self.json {
            self.write_json(failure)
        } else {
            Ok(())
        }
    }

    /// Format the summary of a directory scan.
    pub fn format_scan_summary(&mut self, root: &str, stats: &BatchStats) -> std::io::Result<()> {
        if self.json {
            #[derive(Serialize)]
            struct Summary<'a> {
                root: &'a str,
                #[serde(flatten)]
                stats: &'a BatchStats,
            }
            return self.write_json(&Summary { root, stats });
        }
        writeln!(
            self.writer,
            "{root}: {} files ({} symbols, {} imports, {} exports) in {:.1}s",
            stats.files,
            stats.symbols,
            stats.imports,
            stats.exports,
            stats.elapsed.as_secs_f64()
        )?;
        if stats.failures > 0 || stats.skipped > 0 {
            writeln!(
                self.writer,
                "{root}: {} failed, {} skipped",
                stats.failures, stats.skipped
            )?;
        }
        writeln!(
            self.writer,
            "{root}: {} parsers created for {} parses",
            stats.parsers_created, stats.parses_called
        )
    }
}

// ---------------------------------------------------------------------------
// Stderr helpers
// ---------------------------------------------------------------------------

/// Print a hint message to stderr (suppressed when `json` is true).
pub fn print_hint(msg: &str, json: bool) {
    if !json {
        eprintln!("hint: {msg}");
    }
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("error: {msg}");
}

/// Format a [`GleanError`](crate::errors::GleanError) to stderr with
/// structured `error:` / `hint:` lines and return the process exit code.
pub fn format_error(err: &crate::errors::GleanError, json: bool) -> i32 {
    print_error(&format!("{err}"));
    if let Some(hint) = err.hint() {
        print_hint(hint, json);
    }
    err.exit_code()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
