//! Configuration file parsing, defaults, and merging.
//!
//! Configuration is loaded in layers (last wins):
//! 1. Built-in defaults
//! 2. Global config from `~/.glean/config.toml`
//! 3. Per-root config from `<root>/.glean/config.toml`
//!
//! Each layer only overrides fields it explicitly sets; absent fields
//! are left at their previous value.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::annotations::{TypePriority, TypeSlot};
use crate::parser::default_pool_size;

// ---------------------------------------------------------------------------
// Public config types (fully resolved, no Options)
// ---------------------------------------------------------------------------

/// Top-level configuration, fully resolved with defaults applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub parser: ParserConfig,
    pub extract: ExtractConfig,
    pub output: OutputConfig,
    pub ignore: IgnoreConfig,
}

/// Parser pool settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParserConfig {
    /// Maximum parsers per grammar, and worker threads for batch runs.
    /// `0` derives the size from CPU parallelism.
    pub pool_size: usize,
}

/// Extraction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractConfig {
    /// Files larger than this (in KiB) are skipped by batch runs.
    pub max_file_size_kb: u64,
    /// Order in which competing type captures are consulted.
    pub type_priority: Vec<TypeSlot>,
}

/// Output / display settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    /// Default output format: `"grep"` or `"json"`.
    pub default_format: String,
}

/// Ignore / exclusion settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IgnoreConfig {
    /// Extra glob patterns to exclude from directory walks.
    pub patterns: Vec<String>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_file_size_kb: 1024,
            type_priority: TypePriority::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "grep".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Option-based overlay types (for partial deserialization)
// ---------------------------------------------------------------------------

/// Mirror of [`Config`] where every field is `Option`, so we can
/// deserialize a partial TOML file and overlay only the keys that are
/// present.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigOverlay {
    parser: Option<ParserOverlay>,
    extract: Option<ExtractOverlay>,
    output: Option<OutputOverlay>,
    ignore: Option<IgnoreOverlay>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ParserOverlay {
    pool_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ExtractOverlay {
    max_file_size_kb: Option<u64>,
    type_priority: Option<Vec<TypeSlot>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OutputOverlay {
    default_format: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct IgnoreOverlay {
    patterns: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Merge helpers
// ---------------------------------------------------------------------------

impl Config {
    /// Apply an overlay on top of this config, replacing only the fields
    /// that are `Some` in the overlay.
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(p) = overlay.parser
            && let Some(v) = p.pool_size
        {
            self.parser.pool_size = v;
        }
        if let Some(ex) = overlay.extract {
            if let Some(v) = ex.max_file_size_kb {
                self.extract.max_file_size_kb = v;
            }
            if let Some(v) = ex.type_priority {
                self.extract.type_priority = v;
            }
        }
        if let Some(out) = overlay.output
            && let Some(v) = out.default_format
        {
            self.output.default_format = v;
        }
        if let Some(ign) = overlay.ignore
            && let Some(v) = ign.patterns
        {
            self.ignore.patterns = v;
        }
    }

    /// Parser pool size with `0` resolved through [`default_pool_size`].
    ///
    /// Batch runs size their worker pool with the same value.
    pub fn effective_pool_size(&self) -> usize {
        if self.parser.pool_size == 0 {
            default_pool_size()
        } else {
            self.parser.pool_size
        }
    }

    pub fn type_priority(&self) -> TypePriority {
        TypePriority::new(&self.extract.type_priority)
    }

    /// Maximum file size in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.extract.max_file_size_kb.saturating_mul(1024)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Return the user's home directory.
fn home_dir() -> Option<PathBuf> {
    #[allow(deprecated)]
    std::env::home_dir()
}

/// Parse a TOML string into a [`ConfigOverlay`], producing a clear error
/// message on malformed input.
fn parse_overlay(contents: &str, path: &Path) -> Result<ConfigOverlay> {
    toml::from_str(contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Try to read a config file and parse it as an overlay.
/// Returns `Ok(None)` if the file does not exist.
fn load_overlay(path: &Path) -> Result<Option<ConfigOverlay>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let overlay = parse_overlay(&contents, path)?;
            Ok(Some(overlay))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::anyhow!(
            "failed to read config file {}: {}",
            path.display(),
            e
        )),
    }
}

impl Config {
    /// Load configuration by merging layers:
    /// defaults -> global (`~/.glean/config.toml`) -> per-root (`<root>/.glean/config.toml`).
    ///
    /// If `root` is `None`, only the global config (if any) is applied
    /// on top of defaults.
    pub fn load(root: Option<&Path>) -> Result<Config> {
        let global_dir = home_dir().map(|h| h.join(".glean"));
        Self::load_with_global_dir(global_dir.as_deref(), root)
    }

    /// Load config with an explicit global config directory, so tests can
    /// point it at a temporary directory.
    fn load_with_global_dir(global_dir: Option<&Path>, root: Option<&Path>) -> Result<Config> {
        let mut config = Config::default();

        if let Some(dir) = global_dir {
            let global_path = dir.join("config.toml");
            if let Some(overlay) = load_overlay(&global_path)? {
                config.apply_overlay(overlay);
            }
        }

        if let Some(root) = root {
            let root_config_path = root.join(".glean").join("config.toml");
            if let Some(overlay) = load_overlay(&root_config_path)? {
                config.apply_overlay(overlay);
            }
        }

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
