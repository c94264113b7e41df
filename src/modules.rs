//! Import and export records from module-query matches, plus best-effort
//! resolution of relative module sources to local paths.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tree_sitter::Node;

use crate::node_kind::{NodeKind, node_text};
use crate::query::{QueryCapture, QueryMatch};
use crate::types::{ExportForm, ExportInfo, ImportForm, ImportInfo, Location};

/// Extensions probed, in order, when resolving a relative source.
pub const RESOLVE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".mts", ".cts"];

/// Capture fields that may carry the module source, tried in order.
const SOURCE_FIELDS: &[&str] = &["source", "require_source", "module", "path"];

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Whether a module source names a package rather than a file.
pub fn is_external(source: &str) -> bool {
    !(source.starts_with('.') || source.starts_with('/'))
}

/// Resolve a relative module source against the importing file.
///
/// Probes the source as written, then each known extension, then an
/// `index` file inside it. When nothing exists on disk the guess reuses
/// the importer's own extension. External sources resolve to `None`.
pub fn resolve_module_path(importer: &Path, source: &str) -> Option<String> {
    if is_external(source) {
        return None;
    }
    let dir = importer.parent().unwrap_or_else(|| Path::new(""));
    let base = normalize(&dir.join(source));

    if base.is_file() {
        return Some(base.display().to_string());
    }
    let base_str = base.display().to_string();
    for ext in RESOLVE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{base_str}{ext}"));
        if candidate.is_file() {
            return Some(candidate.display().to_string());
        }
    }
    for ext in RESOLVE_EXTENSIONS {
        let candidate = base.join(format!("index{ext}"));
        if candidate.is_file() {
            return Some(candidate.display().to_string());
        }
    }

    if base.extension().is_some_and(|e| {
        let e = format!(".{}", e.to_string_lossy());
        RESOLVE_EXTENSIONS.contains(&e.as_str())
    }) {
        return Some(base_str);
    }
    let ext = importer
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".js".to_string());
    Some(format!("{base_str}{ext}"))
}

/// Lexically fold `.` and `..` components. Leading `..` that cannot be
/// folded are kept.
fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

fn has_child(node: Node, kind: NodeKind) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| NodeKind::of(c) == kind)
}

/// Whether an import statement's clause binds at least one name.
/// `import {} from './x'` binds nothing.
fn binds_names(statement: Node) -> bool {
    let mut cursor = statement.walk();
    let clauses: Vec<Node> = statement
        .children(&mut cursor)
        .filter(|c| NodeKind::of(*c) == NodeKind::ImportClause)
        .collect();
    clauses.into_iter().any(|clause| {
        let mut cursor = clause.walk();
        let binds = clause
            .named_children(&mut cursor)
            .any(|c| NodeKind::of(c) != NodeKind::NamedImports || c.named_child_count() > 0);
        binds
    })
}

/// The capture with `field`, and the first alias capture after it.
fn with_alias<'m, 'q, 't>(
    m: &'m QueryMatch<'q, 't>,
    field: &str,
) -> Option<(&'m QueryCapture<'q, 't>, Option<&'m QueryCapture<'q, 't>>)> {
    let pos = m.captures.iter().position(|c| c.field == field)?;
    let alias = m.captures[pos + 1..].iter().find(|c| c.field == "alias");
    Some((&m.captures[pos], alias))
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

/// Build import records, one per clause or specifier, in source order.
pub fn build_imports(matches: &[QueryMatch<'_, '_>], importer: &Path) -> Vec<ImportInfo> {
    let mut imports: Vec<ImportInfo> = matches
        .iter()
        .filter(|m| m.captures.iter().any(|c| c.category == "import"))
        .filter_map(|m| build_import(m, importer))
        .collect();
    imports.sort_by_key(|i| i.location.start_byte);
    imports
}

fn build_import(m: &QueryMatch<'_, '_>, importer: &Path) -> Option<ImportInfo> {
    let source = strip_quotes(&m.first_of(SOURCE_FIELDS)?.text).to_string();
    let statement = m.field("statement").map(|c| c.node);
    let commonjs = m.has_field("require_fn") || m.has_field("require_source");

    let mut names = BTreeMap::new();
    let mut specifier = None;
    let form = if let Some(ns) = m.field("namespace") {
        names.insert(ns.text.clone(), "*".to_string());
        ImportForm::Namespace
    } else if let Some(default) = m.field("default") {
        names.insert(default.text.clone(), "default".to_string());
        ImportForm::Default
    } else if let Some((named, alias)) = with_alias(m, "named") {
        let local = alias.map_or(&named.text, |a| &a.text);
        names.insert(local.clone(), named.text.clone());
        specifier = named.node.parent();
        ImportForm::Named
    } else {
        // The catch-all pattern also matches statements whose clauses are
        // reported by the specific patterns above.
        if statement.is_some_and(binds_names) {
            return None;
        }
        ImportForm::SideEffect
    };

    let type_only = !commonjs
        && (statement.is_some_and(|s| has_child(s, NodeKind::TypeKw))
            || specifier.is_some_and(|s| {
                NodeKind::of(s) == NodeKind::ImportSpecifier && has_child(s, NodeKind::TypeKw)
            }));

    let location = statement.map_or_else(
        || m.captures.first().map(|c| c.location).unwrap_or_default(),
        Location::of,
    );

    Some(ImportInfo {
        resolved_path: resolve_module_path(importer, &source),
        is_external: is_external(&source),
        source,
        names,
        form: if type_only { form.type_only() } else { form },
        commonjs,
        location,
    })
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

/// Build export records, one per clause or specifier, in source order.
pub fn build_exports(
    matches: &[QueryMatch<'_, '_>],
    importer: &Path,
    source: &[u8],
) -> Vec<ExportInfo> {
    let mut exports: Vec<ExportInfo> = matches
        .iter()
        .filter(|m| m.captures.iter().any(|c| c.category == "export"))
        .filter_map(|m| {
            let commonjs = m
                .captures
                .iter()
                .any(|c| c.category.contains("commonjs") || c.field.contains("commonjs"));
            if commonjs {
                build_commonjs_export(m, source)
            } else {
                build_export(m, importer, source)
            }
        })
        .collect();
    exports.sort_by_key(|e| e.location.start_byte);
    exports
}

fn build_export(m: &QueryMatch<'_, '_>, importer: &Path, source: &[u8]) -> Option<ExportInfo> {
    let statement = m.field("statement")?.node;
    let module = m.field("source").map(|c| strip_quotes(&c.text).to_string());
    let type_only = has_child(statement, NodeKind::TypeKw);

    let mut names = BTreeMap::new();
    let mut aliases = BTreeMap::new();

    let form = if let Some(decl) = m.field("declaration") {
        let declared = declared_names(decl.node, source);
        if has_child(statement, NodeKind::DefaultKw) {
            let (local, kind) = declared.into_iter().next().unwrap_or_default();
            names.insert("default".to_string(), kind);
            if !local.is_empty() {
                aliases.insert("default".to_string(), local);
            }
            ExportForm::Default
        } else {
            names.extend(declared);
            ExportForm::Named
        }
    } else if let Some(value) = m.field("value") {
        let value_kind = NodeKind::of(value.node);
        let (local, kind) = match value_kind {
            NodeKind::Identifier => (value.text.clone(), "value"),
            NodeKind::Class => (expression_name(value.node, source), "class"),
            k if k.is_function_value() => (expression_name(value.node, source), "function"),
            _ => (String::new(), "value"),
        };
        names.insert("default".to_string(), kind.to_string());
        if !local.is_empty() {
            aliases.insert("default".to_string(), local);
        }
        ExportForm::Default
    } else if m.has_field("wildcard") {
        names.insert("*".to_string(), "*".to_string());
        ExportForm::ReExport
    } else if let Some(ns) = m.field("namespace") {
        names.insert(strip_quotes(&ns.text).to_string(), "*".to_string());
        ExportForm::Namespace
    } else if let Some((name, alias)) = with_alias(m, "name") {
        let local = strip_quotes(&name.text).to_string();
        let exported = alias.map_or_else(|| local.clone(), |a| strip_quotes(&a.text).to_string());
        if exported != local {
            aliases.insert(exported.clone(), local);
        }
        names.insert(exported, "binding".to_string());
        let specifier_type_only = name.node.parent().is_some_and(|s| {
            NodeKind::of(s) == NodeKind::ExportSpecifier && has_child(s, NodeKind::TypeKw)
        });
        let form = if module.is_some() {
            ExportForm::ReExport
        } else {
            ExportForm::Named
        };
        if specifier_type_only {
            form.type_only()
        } else {
            form
        }
    } else {
        return None;
    };

    Some(ExportInfo {
        resolved_path: module.as_deref().and_then(|s| resolve_module_path(importer, s)),
        source: module,
        names,
        aliases,
        form: if type_only { form.type_only() } else { form },
        commonjs: false,
        location: Location::of(statement),
    })
}

/// Names introduced by an exported declaration, with their kinds.
fn declared_names(decl: Node, source: &[u8]) -> Vec<(String, String)> {
    let kind = NodeKind::of(decl);
    match kind {
        // `export declare ...`: the names come from the wrapped declaration.
        NodeKind::AmbientDeclaration => {
            let mut cursor = decl.walk();
            let inner: Vec<Node> = decl.named_children(&mut cursor).collect();
            inner
                .into_iter()
                .filter(|c| NodeKind::of(*c) != NodeKind::Comment)
                .flat_map(|c| declared_names(c, source))
                .filter(|(name, _)| !name.is_empty())
                .collect()
        }
        NodeKind::LexicalDeclaration | NodeKind::VariableDeclaration => {
            let is_const = has_child(decl, NodeKind::ConstKw);
            let mut cursor = decl.walk();
            decl.named_children(&mut cursor)
                .filter(|c| NodeKind::of(*c) == NodeKind::VariableDeclarator)
                .filter_map(|d| {
                    let name = d.child_by_field_name("name")?;
                    let is_function = d
                        .child_by_field_name("value")
                        .is_some_and(|v| NodeKind::of(v).is_function_value());
                    let kind = if is_function {
                        "function"
                    } else if is_const {
                        "constant"
                    } else {
                        "variable"
                    };
                    Some((node_text(name, source).to_string(), kind.to_string()))
                })
                .collect()
        }
        _ => {
            let label = match kind {
                NodeKind::FunctionDeclaration
                | NodeKind::GeneratorFunctionDeclaration
                | NodeKind::FunctionSignature => "function",
                NodeKind::ClassDeclaration | NodeKind::AbstractClassDeclaration | NodeKind::Class => {
                    "class"
                }
                NodeKind::InterfaceDeclaration => "interface",
                NodeKind::TypeAliasDeclaration => "type",
                NodeKind::EnumDeclaration => "enum",
                NodeKind::InternalModule | NodeKind::Module => "namespace",
                _ => "value",
            };
            let name = decl
                .child_by_field_name("name")
                .map(|n| strip_quotes(node_text(n, source)).to_string())
                .unwrap_or_default();
            vec![(name, label.to_string())]
        }
    }
}

fn expression_name(node: Node, source: &[u8]) -> String {
    node.child_by_field_name("name")
        .map(|n| node_text(n, source).to_string())
        .unwrap_or_default()
}

fn build_commonjs_export(m: &QueryMatch<'_, '_>, source: &[u8]) -> Option<ExportInfo> {
    let value = m.field("commonjs_value")?;
    let statement = m.field("commonjs_statement").unwrap_or(value);

    // `export = x` has no target; it replaces the whole module object.
    let path = match m.field("commonjs_target") {
        Some(target) => target.text.strip_prefix("module.").unwrap_or(&target.text),
        None => "exports",
    };
    let mut names = BTreeMap::new();

    let form = if path == "exports" {
        if NodeKind::of(value.node) == NodeKind::Object {
            let mut cursor = value.node.walk();
            for prop in value.node.named_children(&mut cursor) {
                match NodeKind::of(prop) {
                    NodeKind::ShorthandPropertyIdentifier => {
                        names.insert(node_text(prop, source).to_string(), "binding".to_string());
                    }
                    NodeKind::Pair => {
                        if let Some(key) = prop.child_by_field_name("key") {
                            names.insert(
                                strip_quotes(node_text(key, source)).to_string(),
                                "value".to_string(),
                            );
                        }
                    }
                    _ => {}
                }
            }
            ExportForm::Named
        } else {
            names.insert("default".to_string(), "value".to_string());
            ExportForm::Default
        }
    } else {
        let member = path.strip_prefix("exports.")?;
        let name = member.split('.').next().unwrap_or(member);
        names.insert(name.to_string(), "value".to_string());
        ExportForm::Named
    };

    Some(ExportInfo {
        source: None,
        resolved_path: None,
        names,
        aliases: BTreeMap::new(),
        form,
        commonjs: true,
        location: statement.location,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
