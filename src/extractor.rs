//! Single-pass extraction: one parse, several queries over the same tree.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::annotations::{TypePriority, build_type_map};
use crate::errors::ExtractError;
use crate::lang::{Grammar, Lang};
use crate::modules::{build_exports, build_imports};
use crate::parser::{ParsedTree, ParserManager};
use crate::query::{CompiledQuery, QueryKind, QueryManager, QueryMatch};
use crate::symbols::build_symbols;
use crate::types::PerFileResult;

/// Turns source files into [`PerFileResult`]s.
///
/// Cheap to clone and safe to share across worker threads; all state lives
/// in the shared parser and query managers.
#[derive(Clone)]
pub struct Extractor {
    parsers: Arc<ParserManager>,
    queries: Arc<QueryManager>,
    priority: TypePriority,
}

impl Extractor {
    pub fn new(parsers: Arc<ParserManager>, queries: Arc<QueryManager>) -> Self {
        Self {
            parsers,
            queries,
            priority: TypePriority::default(),
        }
    }

    pub fn with_type_priority(mut self, priority: TypePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn parsers(&self) -> &ParserManager {
        &self.parsers
    }

    pub fn queries(&self) -> &QueryManager {
        &self.queries
    }

    /// Extract symbols, imports, exports and annotated types from one file.
    ///
    /// All or nothing: any parse or query failure returns an error and no
    /// partial result. Syntax errors in the source are not failures; the
    /// result is best-effort and flagged.
    pub fn extract_file(&self, path: &Path, source: &[u8]) -> Result<PerFileResult, ExtractError> {
        let grammar = Grammar::for_path(path);
        if grammar.lang == Lang::Unknown {
            return Err(ExtractError::UnsupportedLanguage(path.display().to_string()));
        }

        let tree = self.parsers.parse(source, grammar.lang, grammar.jsx)?;
        let has_syntax_errors = tree.has_error();
        if has_syntax_errors {
            warn!(path = %path.display(), "syntax errors; extracting best-effort");
        }

        let symbols_query = self.query(grammar, QueryKind::Symbols)?;
        let imports_query = self.query(grammar, QueryKind::Imports)?;
        let types_query = self.query(grammar, QueryKind::TypeAnnotations)?;

        let symbol_matches = self.run(&tree, &symbols_query, source)?;
        let module_matches = self.run(&tree, &imports_query, source)?;
        let type_matches = self.run(&tree, &types_query, source)?;

        let result = PerFileResult {
            path: path.display().to_string(),
            language: grammar.lang,
            symbols: build_symbols(&symbol_matches, source),
            imports: build_imports(&module_matches, path),
            exports: build_exports(&module_matches, path, source),
            types: build_type_map(&type_matches, &self.priority),
            has_syntax_errors,
        };

        // Matches borrow the tree; they must go before it closes.
        drop((symbol_matches, module_matches, type_matches));
        tree.close();

        debug!(
            path = %result.path,
            symbols = result.symbols.len(),
            imports = result.imports.len(),
            exports = result.exports.len(),
            "extracted"
        );
        Ok(result)
    }

    fn query(&self, grammar: Grammar, kind: QueryKind) -> Result<Arc<CompiledQuery>, ExtractError> {
        self.queries
            .get_query(grammar, kind)
            .map_err(|source| ExtractError::GetQuery { kind, source })
    }

    fn run<'q, 't>(
        &self,
        tree: &'t ParsedTree,
        query: &'q CompiledQuery,
        source: &[u8],
    ) -> Result<Vec<QueryMatch<'q, 't>>, ExtractError> {
        self.queries
            .execute_query(tree, query, source)
            .map_err(|e| ExtractError::ExecuteQuery {
                kind: query.kind(),
                source: e,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ParseError, QueryError};
    use crate::types::{ExportForm, ImportForm, SymbolKind};

    fn extractor() -> Extractor {
        Extractor::new(Arc::new(ParserManager::new(2)), Arc::new(QueryManager::new()))
    }

    #[test]
    fn get_user_by_id_end_to_end() {
        let src = "export function getUserById(id: number): User {\n  return users[id];\n}\n";
        let result = extractor()
            .extract_file(Path::new("src/users.ts"), src.as_bytes())
            .unwrap();

        assert_eq!(result.language, Lang::TypeScript);
        assert!(!result.has_syntax_errors);
        assert_eq!(result.symbols.len(), 1);
        let f = &result.symbols[0];
        assert_eq!(f.name, "getUserById");
        assert_eq!(f.kind, SymbolKind::Function);
        assert!(f.is_exported);
        assert_eq!(f.parameters, vec!["id"]);
        assert_eq!(f.parameter_types, vec!["number"]);
        assert_eq!(f.return_type, "User");

        assert_eq!(result.exports.len(), 1);
        assert_eq!(result.exports[0].form, ExportForm::Named);
        assert_eq!(result.types.get("id").map(String::as_str), Some("number"));
    }

    #[test]
    fn type_only_import_end_to_end() {
        let src = "import type { Foo } from './types';\n";
        let result = extractor()
            .extract_file(Path::new("src/a.ts"), src.as_bytes())
            .unwrap();
        assert_eq!(result.imports.len(), 1);
        let import = &result.imports[0];
        assert_eq!(import.form, ImportForm::TypeNamed);
        assert_eq!(import.source, "./types");
        assert_eq!(import.names.get("Foo").map(String::as_str), Some("Foo"));
    }

    #[test]
    fn declaration_file_symbols_agree_with_exports() {
        let src = "export function parse(a: string): Node;\n\
                   declare function ambient(x: number): void;\n\
                   export declare const VERSION: string;\n\
                   export const f = function (a: number): string { return ''; };\n";
        let result = extractor()
            .extract_file(Path::new("types/index.d.ts"), src.as_bytes())
            .unwrap();

        assert_eq!(result.symbol("ambient").unwrap().kind, SymbolKind::Function);
        let version = result.symbol("VERSION").unwrap();
        assert!(version.is_exported);
        let f = result.symbol("f").unwrap();
        assert_eq!(f.kind, SymbolKind::Function);

        // Every exported name has a matching symbol of the same kind.
        for export in &result.exports {
            for (name, kind) in &export.names {
                let symbol = result.symbol(name).unwrap();
                assert!(symbol.is_exported, "{name} not marked exported");
                assert_eq!(symbol.kind.as_str(), kind.as_str());
            }
        }
        assert_eq!(result.exports.len(), 3);
    }

    #[test]
    fn one_parse_per_file() {
        let ex = extractor();
        ex.extract_file(Path::new("a.ts"), b"const a = 1;").unwrap();
        ex.extract_file(Path::new("b.tsx"), b"const b = <div/>;").unwrap();
        ex.extract_file(Path::new("c.js"), b"let c;").unwrap();
        assert_eq!(ex.parsers().stats().parses_called, 3);
        assert_eq!(ex.parsers().pool_count(), 3);
        // Three grammars, three kinds each.
        assert_eq!(ex.queries().compilations(), 9);
    }

    #[test]
    fn unsupported_extension_is_rejected_before_parsing() {
        let ex = extractor();
        let err = ex.extract_file(Path::new("main.py"), b"x = 1").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedLanguage(_)));
        assert_eq!(ex.parsers().stats().parses_called, 0);
    }

    #[test]
    fn syntax_errors_are_flagged_not_fatal() {
        let src = "const x: = ;\nexport class Ok {}\n";
        let result = extractor()
            .extract_file(Path::new("broken.ts"), src.as_bytes())
            .unwrap();
        assert!(result.has_syntax_errors);
        assert!(result.symbol("Ok").is_some());
    }

    #[test]
    fn closed_query_manager_fails_the_whole_file() {
        let ex = extractor();
        ex.queries().close();
        let err = ex.extract_file(Path::new("a.ts"), b"const a = 1;").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::GetQuery { kind: QueryKind::Symbols, source: QueryError::Closed }
        ));
        assert!(err.to_string().starts_with("failed to get symbols query"));
    }

    #[test]
    fn closed_parser_manager_is_a_parse_error() {
        let ex = extractor();
        ex.parsers().close();
        let err = ex.extract_file(Path::new("a.js"), b"let a;").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(ParseError::ManagerClosed)));
    }

    #[test]
    fn javascript_file_with_commonjs() {
        let src = "const path = require('path');\nclass Loader {}\nmodule.exports = Loader;\n";
        let result = extractor()
            .extract_file(Path::new("lib/loader.cjs"), src.as_bytes())
            .unwrap();
        assert_eq!(result.language, Lang::JavaScript);
        assert!(result.imports[0].commonjs);
        assert!(result.imports[0].is_external);
        assert_eq!(result.exports[0].form, ExportForm::Default);
        assert_eq!(result.symbol("Loader").unwrap().kind, SymbolKind::Class);
    }
}
