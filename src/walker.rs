//! Source file walker with gitignore support and default exclusions.
//!
//! Wraps the `ignore` crate's `WalkBuilder` to provide a walker that:
//! - Respects `.gitignore` rules
//! - Skips dependency and build output directories by default
//! - Skips hidden files/directories
//! - Applies extra exclusion globs from configuration
//! - Yields only files with a supported source extension

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;

use crate::lang::{Lang, detect_language};

/// Directories that are always excluded from walks, regardless of `.gitignore`.
const DEFAULT_EXCLUSIONS: &[&str] = &["node_modules", "vendor", "dist", "build", "coverage", "out"];

/// A file-system walker over supported source files.
pub struct Walker {
    root: PathBuf,
    patterns: Vec<String>,
}

impl Walker {
    /// Create a new walker rooted at the given path.
    ///
    /// The path may be a subdirectory of a repository; the walker will still
    /// respect `.gitignore` files from parent directories.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            patterns: Vec::new(),
        }
    }

    /// Extra glob patterns to exclude, typically from `[ignore] patterns`.
    pub fn exclude(mut self, patterns: &[String]) -> Self {
        self.patterns.extend(patterns.iter().cloned());
        self
    }

    fn make_builder(&self) -> Result<WalkBuilder, ignore::Error> {
        let mut builder = WalkBuilder::new(&self.root);
        builder.standard_filters(true);

        // In override globs a leading `!` excludes; no whitelist globs are
        // added, so everything else stays included.
        let mut overrides = OverrideBuilder::new(&self.root);
        for dir in DEFAULT_EXCLUSIONS {
            overrides.add(&format!("!{dir}/"))?;
        }
        for pattern in &self.patterns {
            overrides.add(&format!("!{pattern}"))?;
        }
        builder.overrides(overrides.build()?);

        Ok(builder)
    }

    /// Walk the tree and collect supported source files, sorted.
    ///
    /// Unreadable entries are skipped. Fails only when an exclusion glob is
    /// malformed.
    pub fn collect_paths(&self) -> Result<Vec<PathBuf>, ignore::Error> {
        let builder = self.make_builder()?;
        let mut paths: Vec<PathBuf> = builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| detect_language(path) != Lang::Unknown)
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TestDir {
        dir: tempfile::TempDir,
    }

    impl TestDir {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        /// Create a file (and any necessary parent directories).
        fn create_file(&self, relative: &str) {
            let p = self.dir.path().join(relative);
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&p, "export {};\n").unwrap();
        }
    }

    fn relative(root: &Path, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|p| {
                p.strip_prefix(root)
                    .ok()
                    .map(|r| r.to_string_lossy().into_owned())
            })
            .collect()
    }

    #[test]
    fn yields_only_supported_sources() {
        let td = TestDir::new();
        td.create_file("src/app.ts");
        td.create_file("src/view.tsx");
        td.create_file("lib/util.mjs");
        td.create_file("README.md");
        td.create_file("styles.css");

        let paths = Walker::new(td.path()).collect_paths().unwrap();
        let rel = relative(td.path(), &paths);
        assert_eq!(rel, vec!["lib/util.mjs", "src/app.ts", "src/view.tsx"]);
    }

    #[test]
    fn respects_gitignore() {
        let td = TestDir::new();
        // The ignore crate only applies .gitignore inside a git repository.
        fs::create_dir(td.path().join(".git")).unwrap();
        td.create_file("keep.ts");
        td.create_file("generated.js");
        fs::write(td.path().join(".gitignore"), "generated.js\n").unwrap();

        let paths = Walker::new(td.path()).collect_paths().unwrap();
        assert_eq!(relative(td.path(), &paths), vec!["keep.ts"]);
    }

    #[test]
    fn skips_default_exclusions_and_hidden() {
        let td = TestDir::new();
        td.create_file("src/index.ts");
        td.create_file("node_modules/react/index.js");
        td.create_file("dist/bundle.js");
        td.create_file("build/out.js");
        td.create_file("coverage/lcov.js");
        td.create_file(".cache/x.js");

        let paths = Walker::new(td.path()).collect_paths().unwrap();
        assert_eq!(relative(td.path(), &paths), vec!["src/index.ts"]);
    }

    #[test]
    fn config_patterns_exclude_files() {
        let td = TestDir::new();
        td.create_file("src/api.ts");
        td.create_file("src/api.gen.ts");
        td.create_file("fixtures/sample.js");

        let patterns = vec!["*.gen.ts".to_string(), "fixtures/".to_string()];
        let paths = Walker::new(td.path())
            .exclude(&patterns)
            .collect_paths()
            .unwrap();
        assert_eq!(relative(td.path(), &paths), vec!["src/api.ts"]);
    }

    #[test]
    fn malformed_pattern_is_an_error() {
        let td = TestDir::new();
        let patterns = vec!["src/[".to_string()];
        assert!(Walker::new(td.path()).exclude(&patterns).collect_paths().is_err());
    }
}
