//! Shared types and data structures.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tree_sitter::Node;

use crate::lang::Lang;

/// A source span: 1-based line/column and 0-based byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Location {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Location {
    /// Compute the location spanned by a tree-sitter node.
    pub fn of(node: Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_line: start.row + 1,
            start_column: start.column + 1,
            end_line: end.row + 1,
            end_column: end.column + 1,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
        }
    }
}

/// The kind of a symbol definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Constant,
    Enum,
    Method,
    Property,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Enum => "enum",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member visibility keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

impl Visibility {
    pub fn from_keyword(text: &str) -> Option<Self> {
        match text.trim() {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            _ => None,
        }
    }
}

/// Declaration modifier keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Static,
    Async,
    Readonly,
    Abstract,
    Const,
}

impl Modifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Static => "static",
            Modifier::Async => "async",
            Modifier::Readonly => "readonly",
            Modifier::Abstract => "abstract",
            Modifier::Const => "const",
        }
    }
}

/// A symbol definition extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    /// The symbol name (e.g. function name, class name).
    pub name: String,
    /// Enclosing class/interface/namespace names and the name, dot-joined.
    pub fqn: String,
    pub kind: SymbolKind,
    /// Span of the whole declaration, not just the identifier.
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<Modifier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    /// Parallel to `parameters`; empty string when a parameter is untyped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameter_types: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub return_type: String,
    pub is_exported: bool,
}

impl Symbol {
    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

/// How an import binds names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportForm {
    Named,
    Default,
    Namespace,
    SideEffect,
    TypeNamed,
    TypeDefault,
    TypeNamespace,
}

impl ImportForm {
    /// The type-only counterpart of a value form.
    pub fn type_only(self) -> Self {
        match self {
            ImportForm::Named => ImportForm::TypeNamed,
            ImportForm::Default => ImportForm::TypeDefault,
            ImportForm::Namespace => ImportForm::TypeNamespace,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportForm::Named => "named",
            ImportForm::Default => "default",
            ImportForm::Namespace => "namespace",
            ImportForm::SideEffect => "side_effect",
            ImportForm::TypeNamed => "type_named",
            ImportForm::TypeDefault => "type_default",
            ImportForm::TypeNamespace => "type_namespace",
        }
    }
}

/// One import clause or specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportInfo {
    /// Module source string, quotes stripped.
    pub source: String,
    /// Best-effort local path for relative sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    pub is_external: bool,
    /// Local binding name to imported name (`default` / `*` for default
    /// and namespace bindings).
    pub names: BTreeMap<String, String>,
    pub form: ImportForm,
    /// True for `require(...)` based imports.
    pub commonjs: bool,
    pub location: Location,
}

/// How an export exposes names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportForm {
    Named,
    Default,
    Namespace,
    ReExport,
    TypeNamed,
    TypeReExport,
}

impl ExportForm {
    pub fn type_only(self) -> Self {
        match self {
            ExportForm::Named => ExportForm::TypeNamed,
            ExportForm::ReExport => ExportForm::TypeReExport,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportForm::Named => "named",
            ExportForm::Default => "default",
            ExportForm::Namespace => "namespace",
            ExportForm::ReExport => "re_export",
            ExportForm::TypeNamed => "type_named",
            ExportForm::TypeReExport => "type_re_export",
        }
    }
}

/// One export clause or specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportInfo {
    /// Source module for re-exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    /// Exported name to what it names: a symbol kind for declarations,
    /// `value` for expressions, `binding` for specifiers.
    pub names: BTreeMap<String, String>,
    /// Exported name to local name, for `export { a as b }`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
    pub form: ExportForm,
    pub commonjs: bool,
    pub location: Location,
}

/// Everything extracted from a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerFileResult {
    pub path: String,
    pub language: Lang,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    /// Variable, parameter and property names to their annotated type.
    pub types: BTreeMap<String, String>,
    pub has_syntax_errors: bool,
}

impl PerFileResult {
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_kind_display() {
        assert_eq!(SymbolKind::Function.to_string(), "function");
        assert_eq!(SymbolKind::Constant.to_string(), "constant");
    }

    #[test]
    fn visibility_keywords() {
        assert_eq!(Visibility::from_keyword("private"), Some(Visibility::Private));
        assert_eq!(Visibility::from_keyword(" public "), Some(Visibility::Public));
        assert_eq!(Visibility::from_keyword("internal"), None);
    }

    #[test]
    fn import_form_type_only() {
        assert_eq!(ImportForm::Named.type_only(), ImportForm::TypeNamed);
        assert_eq!(ImportForm::SideEffect.type_only(), ImportForm::SideEffect);
        assert_eq!(ImportForm::Namespace.type_only(), ImportForm::TypeNamespace);
    }

    #[test]
    fn export_form_type_only() {
        assert_eq!(ExportForm::ReExport.type_only(), ExportForm::TypeReExport);
        assert_eq!(ExportForm::Default.type_only(), ExportForm::Default);
    }

    #[test]
    fn serialized_forms_are_snake_case() {
        let json = serde_json::to_string(&ImportForm::TypeNamed).unwrap();
        assert_eq!(json, "\"type_named\"");
        let json = serde_json::to_string(&Lang::TypeScript).unwrap();
        assert_eq!(json, "\"typescript\"");
    }
}
