//! Source dialect detection and grammar binding.
//!
//! Two related dialects are supported: the typed one (TypeScript) and the
//! untyped one (JavaScript). The typed dialect additionally has a JSX
//! variant (`.tsx`) backed by a separate grammar. Detection is a pure
//! function of the path string and never touches the file system.

use std::fmt;
use std::path::Path;

use serde::Serialize;

/// Supported source dialects, plus the `Unknown` sentinel returned for any
/// other extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    TypeScript,
    JavaScript,
    Unknown,
}

impl Lang {
    /// Returns the lowercase name used in messages and output.
    pub fn name(self) -> &'static str {
        match self {
            Lang::TypeScript => "typescript",
            Lang::JavaScript => "javascript",
            Lang::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detect the dialect of a file based on its extension.
///
/// Returns [`Lang::Unknown`] for unsupported or missing extensions.
pub fn detect_language(path: &Path) -> Lang {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return Lang::Unknown;
    };
    match ext {
        "ts" | "mts" | "cts" | "tsx" => Lang::TypeScript,
        "js" | "jsx" | "mjs" | "cjs" => Lang::JavaScript,
        _ => Lang::Unknown,
    }
}

/// Whether the path names a JSX-flavoured file (`.tsx` or `.jsx`).
///
/// Only meaningful for the typed dialect; the untyped grammar parses JSX
/// unconditionally and [`Grammar::new`] discards the flag for it.
pub fn is_jsx_variant(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("tsx") | Some("jsx")
    )
}

/// A concrete grammar: a dialect plus its JSX variant switch.
///
/// This is the cache key for parser pools and compiled queries. Queries
/// compiled against one grammar cannot be run against trees produced by
/// another, so the JSX switch is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grammar {
    pub lang: Lang,
    pub jsx: bool,
}

impl Grammar {
    /// Build a grammar key, normalizing the JSX flag away for every
    /// dialect except TypeScript.
    pub fn new(lang: Lang, jsx: bool) -> Self {
        Self {
            lang,
            jsx: jsx && lang == Lang::TypeScript,
        }
    }

    /// Resolve the grammar for a file path.
    pub fn for_path(path: &Path) -> Self {
        Self::new(detect_language(path), is_jsx_variant(path))
    }

    /// Return the tree-sitter language for this grammar, or `None` for the
    /// unknown sentinel.
    pub fn ts_language(self) -> Option<tree_sitter::Language> {
        match (self.lang, self.jsx) {
            (Lang::TypeScript, false) => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            (Lang::TypeScript, true) => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            (Lang::JavaScript, _) => Some(tree_sitter_javascript::LANGUAGE.into()),
            (Lang::Unknown, _) => None,
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.jsx {
            write!(f, "{}+jsx", self.lang)
        } else {
            write!(f, "{}", self.lang)
        }
    }
}
