//! Query compilation, caching and execution.
//!
//! Query programs are compiled once per (grammar, kind) and shared
//! read-only through an [`Arc`]. Execution takes no lock: a compiled query
//! is immutable, and each execution uses its own cursor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Node, QueryCursor};

use crate::errors::QueryError;
use crate::lang::{Grammar, Lang};
use crate::parser::ParsedTree;
use crate::types::Location;

const TYPESCRIPT_SYMBOLS: &str = include_str!("queries/typescript_symbols.scm");
const JAVASCRIPT_SYMBOLS: &str = include_str!("queries/javascript_symbols.scm");
const MODULES: &str = include_str!("queries/modules.scm");
const TYPESCRIPT_MODULES: &str = concat!(
    include_str!("queries/modules.scm"),
    include_str!("queries/typescript_modules.scm")
);
const TYPESCRIPT_TYPES: &str = include_str!("queries/typescript_types.scm");
const JAVASCRIPT_TYPES: &str = include_str!("queries/javascript_types.scm");

/// The query programs the extractor runs against every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Symbols,
    Imports,
    TypeAnnotations,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [
        QueryKind::Symbols,
        QueryKind::Imports,
        QueryKind::TypeAnnotations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Symbols => "symbols",
            QueryKind::Imports => "imports",
            QueryKind::TypeAnnotations => "type-annotations",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query source for a dialect, or `None` when the dialect has no query of
/// that kind.
pub fn query_source(lang: Lang, kind: QueryKind) -> Option<&'static str> {
    match (lang, kind) {
        (Lang::TypeScript, QueryKind::Symbols) => Some(TYPESCRIPT_SYMBOLS),
        (Lang::JavaScript, QueryKind::Symbols) => Some(JAVASCRIPT_SYMBOLS),
        (Lang::TypeScript, QueryKind::Imports) => Some(TYPESCRIPT_MODULES),
        (Lang::JavaScript, QueryKind::Imports) => Some(MODULES),
        (Lang::TypeScript, QueryKind::TypeAnnotations) => Some(TYPESCRIPT_TYPES),
        (Lang::JavaScript, QueryKind::TypeAnnotations) => Some(JAVASCRIPT_TYPES),
        (Lang::Unknown, _) => None,
    }
}

/// Split a capture name on its first `.` into (category, field).
///
/// A name without a dot is all category: `"package_name"` gives
/// `("package_name", "")`.
pub fn parse_capture_name(name: &str) -> (&str, &str) {
    name.split_once('.').unwrap_or((name, ""))
}

// ---------------------------------------------------------------------------
// CompiledQuery
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CaptureName {
    full: String,
    category: String,
    field: String,
}

/// An immutable compiled query, shared across any number of executions.
#[derive(Debug)]
pub struct CompiledQuery {
    query: tree_sitter::Query,
    grammar: Grammar,
    kind: QueryKind,
    /// Indexed by capture index.
    captures: Vec<CaptureName>,
}

impl CompiledQuery {
    fn compile(grammar: Grammar, kind: QueryKind, source: &str) -> Result<Self, QueryError> {
        let language = grammar.ts_language().ok_or(QueryError::Unsupported { kind })?;
        let query =
            tree_sitter::Query::new(&language, source).map_err(|e| QueryError::Compile {
                kind,
                grammar,
                message: e.to_string(),
            })?;
        let captures = query
            .capture_names()
            .iter()
            .map(|name| {
                let (category, field) = parse_capture_name(name);
                CaptureName {
                    full: name.to_string(),
                    category: category.to_string(),
                    field: field.to_string(),
                }
            })
            .collect();
        Ok(Self {
            query,
            grammar,
            kind,
            captures,
        })
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn pattern_count(&self) -> usize {
        self.query.pattern_count()
    }

    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.captures.iter().map(|c| c.full.as_str())
    }

    /// Run this query over `tree`.
    ///
    /// `source` must be the buffer the tree was parsed from. Captures
    /// borrow from both the query (names) and the tree (nodes).
    pub fn execute<'q, 't>(
        &'q self,
        tree: &'t ParsedTree,
        source: &[u8],
    ) -> Result<Vec<QueryMatch<'q, 't>>, QueryError> {
        if tree.grammar() != self.grammar {
            return Err(QueryError::GrammarMismatch {
                kind: self.kind,
                query: self.grammar,
                tree: tree.grammar(),
            });
        }
        if source.len() != tree.source_len() {
            return Err(QueryError::SourceMismatch {
                expected: tree.source_len(),
                actual: source.len(),
            });
        }

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.query, tree.root_node(), source);
        let mut results = Vec::new();
        while let Some(m) = matches.next() {
            let captures = m
                .captures
                .iter()
                .map(|c| {
                    let name = &self.captures[c.index as usize];
                    QueryCapture {
                        name: &name.full,
                        category: &name.category,
                        field: &name.field,
                        node: c.node,
                        text: c.node.utf8_text(source).unwrap_or("").to_string(),
                        location: Location::of(c.node),
                    }
                })
                .collect();
            results.push(QueryMatch {
                pattern_index: m.pattern_index,
                captures,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// One match of a compiled query. Valid only while the tree is alive.
#[derive(Debug, Clone)]
pub struct QueryMatch<'q, 't> {
    pub pattern_index: usize,
    pub captures: Vec<QueryCapture<'q, 't>>,
}

impl<'q, 't> QueryMatch<'q, 't> {
    /// First capture with the given field.
    pub fn field(&self, field: &str) -> Option<&QueryCapture<'q, 't>> {
        self.captures.iter().find(|c| c.field == field)
    }

    /// First capture whose field is any of `fields`, tried in order.
    pub fn first_of(&self, fields: &[&str]) -> Option<&QueryCapture<'q, 't>> {
        fields.iter().find_map(|f| self.field(f))
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.field(field).is_some()
    }
}

/// One named sub-match bound to a node.
#[derive(Debug, Clone)]
pub struct QueryCapture<'q, 't> {
    pub name: &'q str,
    pub category: &'q str,
    pub field: &'q str,
    pub node: Node<'t>,
    pub text: String,
    pub location: Location,
}

// ---------------------------------------------------------------------------
// QueryManager
// ---------------------------------------------------------------------------

/// Compiles each (grammar, kind) query at most once and hands out shared
/// handles to it.
#[derive(Default)]
pub struct QueryManager {
    cache: RwLock<HashMap<(Grammar, QueryKind), Arc<CompiledQuery>>>,
    compilations: AtomicUsize,
    closed: AtomicBool,
}

impl QueryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled query for `grammar` and `kind`, compiling it on
    /// first request.
    ///
    /// Compilation happens under the write lock after a re-check, so
    /// concurrent first requests compile once. Failures are not cached.
    pub fn get_query(
        &self,
        grammar: Grammar,
        kind: QueryKind,
    ) -> Result<Arc<CompiledQuery>, QueryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueryError::Closed);
        }
        let source = query_source(grammar.lang, kind).ok_or(QueryError::Unsupported { kind })?;
        let key = (grammar, kind);

        if let Some(query) = self.cache.read().get(&key) {
            return Ok(Arc::clone(query));
        }

        let mut cache = self.cache.write();
        if let Some(query) = cache.get(&key) {
            return Ok(Arc::clone(query));
        }
        let query = Arc::new(CompiledQuery::compile(grammar, kind, source)?);
        self.compilations.fetch_add(1, Ordering::Relaxed);
        debug!(
            grammar = %grammar,
            kind = %kind,
            patterns = query.pattern_count(),
            "compiled query"
        );
        cache.insert(key, Arc::clone(&query));
        Ok(query)
    }

    /// Execute `query` against `tree`. Takes no lock.
    pub fn execute_query<'q, 't>(
        &self,
        tree: &'t ParsedTree,
        query: &'q CompiledQuery,
        source: &[u8],
    ) -> Result<Vec<QueryMatch<'q, 't>>, QueryError> {
        query.execute(tree, source)
    }

    /// Number of successful compilations so far.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Number of cached queries.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    /// Drop every cached query. The manager rejects further requests;
    /// handles already given out stay valid until their last owner drops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.cache.write().clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserManager;
    use std::thread;

    fn grammars() -> [Grammar; 3] {
        [
            Grammar::new(Lang::TypeScript, false),
            Grammar::new(Lang::TypeScript, true),
            Grammar::new(Lang::JavaScript, false),
        ]
    }

    // ---------- capture names ----------

    #[test]
    fn capture_name_with_field() {
        assert_eq!(parse_capture_name("function.name"), ("function", "name"));
        assert_eq!(parse_capture_name("call.definition"), ("call", "definition"));
    }

    #[test]
    fn capture_name_without_dot() {
        assert_eq!(parse_capture_name("package_name"), ("package_name", ""));
    }

    #[test]
    fn capture_name_splits_on_first_dot_only() {
        assert_eq!(parse_capture_name("export.commonjs.x"), ("export", "commonjs.x"));
    }

    // ---------- compilation ----------

    #[test]
    fn every_bundled_query_compiles() {
        let mgr = QueryManager::new();
        for grammar in grammars() {
            for kind in QueryKind::ALL {
                let q = mgr
                    .get_query(grammar, kind)
                    .unwrap_or_else(|e| panic!("{grammar} {kind}: {e}"));
                assert!(q.pattern_count() > 0);
                assert_eq!(q.kind(), kind);
                assert_eq!(q.grammar(), grammar);
            }
        }
        assert_eq!(mgr.compilations(), 9);
        assert_eq!(mgr.cached(), 9);
    }

    #[test]
    fn unknown_language_is_unsupported() {
        let mgr = QueryManager::new();
        let err = mgr
            .get_query(Grammar::new(Lang::Unknown, false), QueryKind::TypeAnnotations)
            .unwrap_err();
        assert!(matches!(err, QueryError::Unsupported { kind: QueryKind::TypeAnnotations }));
        assert_eq!(mgr.compilations(), 0);
    }

    #[test]
    fn malformed_query_is_a_compile_error() {
        let err = CompiledQuery::compile(
            Grammar::new(Lang::JavaScript, false),
            QueryKind::Symbols,
            "(no_such_node) @x.name",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("failed to compile symbols query for javascript"), "{msg}");
    }

    #[test]
    fn repeated_requests_share_one_handle() {
        let mgr = QueryManager::new();
        let g = Grammar::new(Lang::TypeScript, false);
        let a = mgr.get_query(g, QueryKind::Symbols).unwrap();
        let b = mgr.get_query(g, QueryKind::Symbols).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mgr.compilations(), 1);
    }

    #[test]
    fn concurrent_first_access_compiles_once() {
        let mgr = QueryManager::new();
        let g = Grammar::new(Lang::TypeScript, false);
        let handles: Vec<Arc<CompiledQuery>> = thread::scope(|s| {
            let workers: Vec<_> = (0..16)
                .map(|_| s.spawn(|| mgr.get_query(g, QueryKind::Imports).unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        for h in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], h));
        }
        assert_eq!(mgr.compilations(), 1);
    }

    #[test]
    fn closed_manager_rejects_requests() {
        let mgr = QueryManager::new();
        let g = Grammar::new(Lang::JavaScript, false);
        let q = mgr.get_query(g, QueryKind::Symbols).unwrap();
        mgr.close();
        assert_eq!(mgr.cached(), 0);
        assert!(matches!(mgr.get_query(g, QueryKind::Symbols), Err(QueryError::Closed)));
        // Handles already given out remain usable.
        assert!(q.pattern_count() > 0);
    }

    // ---------- execution ----------

    #[test]
    fn execute_resolves_capture_names_and_locations() {
        let parsers = ParserManager::new(2);
        let queries = QueryManager::new();
        let src = "function getUser(id: number) {}\n";
        let tree = parsers.parse(src.as_bytes(), Lang::TypeScript, false).unwrap();
        let q = queries
            .get_query(tree.grammar(), QueryKind::Symbols)
            .unwrap();
        let matches = queries.execute_query(&tree, &q, src.as_bytes()).unwrap();

        let name = matches
            .iter()
            .find_map(|m| m.field("name"))
            .expect("function name capture");
        assert_eq!(name.name, "function.name");
        assert_eq!(name.category, "function");
        assert_eq!(name.text, "getUser");
        assert_eq!(name.location.start_line, 1);
        assert_eq!(name.location.start_column, 10);
        assert_eq!(name.location.start_byte, 9);
        assert_eq!(name.location.end_byte, 16);

        let def = matches
            .iter()
            .find_map(|m| m.field("definition"))
            .expect("function definition capture");
        assert_eq!(def.node.kind(), "function_declaration");
    }

    #[test]
    fn execute_rejects_other_grammar() {
        let parsers = ParserManager::new(2);
        let queries = QueryManager::new();
        let src = b"let a = 1;";
        let tree = parsers.parse(src, Lang::JavaScript, false).unwrap();
        let q = queries
            .get_query(Grammar::new(Lang::TypeScript, false), QueryKind::Symbols)
            .unwrap();
        let err = queries.execute_query(&tree, &q, src).unwrap_err();
        assert!(matches!(err, QueryError::GrammarMismatch { .. }));
    }

    #[test]
    fn execute_rejects_foreign_source() {
        let parsers = ParserManager::new(2);
        let queries = QueryManager::new();
        let tree = parsers.parse(b"let a = 1;", Lang::JavaScript, false).unwrap();
        let q = queries.get_query(tree.grammar(), QueryKind::Symbols).unwrap();
        let err = queries.execute_query(&tree, &q, b"let ab = 1;").unwrap_err();
        assert!(matches!(err, QueryError::SourceMismatch { expected: 10, actual: 11 }));
    }

    #[test]
    fn execute_on_error_tree_is_best_effort() {
        let parsers = ParserManager::new(2);
        let queries = QueryManager::new();
        let src = "const x: = ;\nfunction ok() {}\n";
        let tree = parsers.parse(src.as_bytes(), Lang::TypeScript, false).unwrap();
        assert!(tree.has_error());
        let q = queries.get_query(tree.grammar(), QueryKind::Symbols).unwrap();
        let matches = q.execute(&tree, src.as_bytes()).unwrap();
        assert!(matches.iter().any(|m| m.field("name").is_some_and(|c| c.text == "ok")));
    }
}
