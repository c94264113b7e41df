//! Symbol records from symbol-query matches.
//!
//! Each match contributes at most one symbol, keyed by its name node. The
//! span, fully-qualified name and metadata all come from walking the raw
//! tree around that node.

use std::collections::HashMap;

use tree_sitter::Node;

use crate::node_kind::{NodeKind, node_text};
use crate::query::QueryMatch;
use crate::types::{Location, Modifier, Symbol, SymbolKind, Visibility};

/// Upper bound on the walk from a name node to its declaration.
const MAX_DECLARATION_DEPTH: usize = 8;
/// Upper bound on the scope-chain walk.
const MAX_SCOPE_DEPTH: usize = 64;

/// Map a capture category to a symbol kind. Unknown categories become
/// variables so new patterns degrade to something visible.
pub fn kind_for_category(category: &str) -> SymbolKind {
    match category {
        "function" => SymbolKind::Function,
        "class" => SymbolKind::Class,
        "interface" => SymbolKind::Interface,
        "type" => SymbolKind::Type,
        "enum" => SymbolKind::Enum,
        "method" => SymbolKind::Method,
        "property" => SymbolKind::Property,
        "constant" => SymbolKind::Constant,
        _ => SymbolKind::Variable,
    }
}

/// Build one symbol per distinct name node, in source order.
///
/// A const arrow function matches both the function and the constant
/// pattern; the function reading wins.
pub fn build_symbols(matches: &[QueryMatch<'_, '_>], source: &[u8]) -> Vec<Symbol> {
    let mut symbols: Vec<(usize, Symbol)> = Vec::new();
    let mut seen: HashMap<(usize, usize), usize> = HashMap::new();

    for m in matches {
        let Some(name) = m.field("name") else {
            continue;
        };
        if name.text.is_empty() {
            continue;
        }
        let kind = kind_for_category(name.category);
        let key = (name.node.start_byte(), name.node.end_byte());

        if let Some(&idx) = seen.get(&key) {
            let existing = &mut symbols[idx].1;
            if kind == SymbolKind::Function
                && matches!(existing.kind, SymbolKind::Variable | SymbolKind::Constant)
            {
                existing.kind = SymbolKind::Function;
            }
            continue;
        }

        let symbol = build_symbol(name.node, &name.text, kind, source);
        seen.insert(key, symbols.len());
        symbols.push((key.0, symbol));
    }

    symbols.sort_by_key(|(start, _)| *start);
    symbols.into_iter().map(|(_, s)| s).collect()
}

fn build_symbol(name_node: Node, name: &str, kind: SymbolKind, source: &[u8]) -> Symbol {
    let declaration = find_declaration(name_node);
    let location = match declaration {
        Some(decl) => Location::of(export_wrapper(decl).unwrap_or(decl)),
        None => Location::of(name_node),
    };
    let fqn = fully_qualified_name(declaration.unwrap_or(name_node), name, source);

    let mut symbol = Symbol {
        name: name.to_string(),
        fqn,
        kind,
        location,
        visibility: None,
        modifiers: Vec::new(),
        parameters: Vec::new(),
        parameter_types: Vec::new(),
        return_type: String::new(),
        is_exported: is_exported(name_node),
    };
    if let Some(decl) = declaration {
        extract_metadata(&mut symbol, decl, name_node, source);
    }
    symbol
}

// ---------------------------------------------------------------------------
// Ancestor walks
// ---------------------------------------------------------------------------

/// Walk up from a name node to the node spanning its whole declaration.
pub fn find_declaration(name_node: Node) -> Option<Node> {
    let mut current = name_node.parent();
    for _ in 0..MAX_DECLARATION_DEPTH {
        let node = current?;
        if NodeKind::of(node).is_declaration() {
            return Some(node);
        }
        current = node.parent();
    }
    None
}

/// The `export` statement around a declaration, or the `declare` wrapper
/// when the declaration is ambient and not exported.
fn export_wrapper(decl: Node) -> Option<Node> {
    let ambient = decl
        .parent()
        .filter(|p| NodeKind::of(*p) == NodeKind::AmbientDeclaration);
    let inner = ambient.unwrap_or(decl);
    inner
        .parent()
        .filter(|p| NodeKind::of(*p) == NodeKind::ExportStatement)
        .or(ambient)
}

/// Enclosing class, interface and namespace names, outermost first, with
/// `name` appended.
pub fn fully_qualified_name(start: Node, name: &str, source: &[u8]) -> String {
    let mut scopes: Vec<&str> = Vec::new();
    let mut current = start.parent();
    for _ in 0..MAX_SCOPE_DEPTH {
        let Some(node) = current else {
            break;
        };
        if NodeKind::of(node).is_scope()
            && let Some(scope) = node.child_by_field_name("name")
        {
            let text = node_text(scope, source).trim_matches(|c| c == '"' || c == '\'');
            if !text.is_empty() {
                scopes.push(text);
            }
        }
        current = node.parent();
    }
    scopes.reverse();
    scopes.push(name);
    scopes.join(".")
}

/// Whether the name's parent or grandparent is an export statement.
///
/// Variable names sit one level deeper than other declarations, so the
/// check starts from the declarator for them. A `declare` wrapper does not
/// count as a level.
pub fn is_exported(name_node: Node) -> bool {
    let anchor = match name_node.parent() {
        Some(p) if NodeKind::of(p) == NodeKind::VariableDeclarator => p,
        _ => name_node,
    };
    let mut levels = 0;
    let mut current = anchor.parent();
    while let Some(node) = current {
        match NodeKind::of(node) {
            NodeKind::ExportStatement => return true,
            NodeKind::AmbientDeclaration => {}
            _ => {
                levels += 1;
                if levels == 2 {
                    return false;
                }
            }
        }
        current = node.parent();
    }
    false
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

fn extract_metadata(symbol: &mut Symbol, decl: Node, name_node: Node, source: &[u8]) {
    let mut cursor = decl.walk();
    for child in decl.children(&mut cursor) {
        match NodeKind::of(child) {
            NodeKind::AccessibilityModifier => {
                symbol.visibility = Visibility::from_keyword(node_text(child, source));
            }
            NodeKind::StaticKw => push_modifier(symbol, Modifier::Static),
            NodeKind::AsyncKw => push_modifier(symbol, Modifier::Async),
            NodeKind::ReadonlyKw => push_modifier(symbol, Modifier::Readonly),
            NodeKind::AbstractKw => push_modifier(symbol, Modifier::Abstract),
            NodeKind::ConstKw => push_modifier(symbol, Modifier::Const),
            _ => {}
        }
    }

    // Function-valued variables and fields carry their signature on the
    // value.
    let signature = match NodeKind::of(decl) {
        NodeKind::LexicalDeclaration | NodeKind::VariableDeclaration => name_node
            .parent()
            .filter(|p| NodeKind::of(*p) == NodeKind::VariableDeclarator)
            .and_then(|d| d.child_by_field_name("value"))
            .filter(|v| NodeKind::of(*v).is_function_value()),
        NodeKind::PublicFieldDefinition | NodeKind::FieldDefinition => decl
            .child_by_field_name("value")
            .filter(|v| NodeKind::of(*v).is_function_value()),
        _ => Some(decl),
    };
    let Some(signature) = signature else {
        return;
    };

    if signature != decl {
        let mut cursor = signature.walk();
        if signature
            .children(&mut cursor)
            .any(|c| NodeKind::of(c) == NodeKind::AsyncKw)
        {
            push_modifier(symbol, Modifier::Async);
        }
    }

    if let Some(params) = signature.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            if let Some((name, ty)) = parameter(param, source) {
                symbol.parameters.push(name);
                symbol.parameter_types.push(ty);
            }
        }
    } else if let Some(param) = signature.child_by_field_name("parameter") {
        // `x => ...`
        symbol.parameters.push(node_text(param, source).to_string());
        symbol.parameter_types.push(String::new());
    }

    if let Some(ret) = signature.child_by_field_name("return_type") {
        symbol.return_type = annotation_text(ret, source);
    }
}

fn push_modifier(symbol: &mut Symbol, modifier: Modifier) {
    if !symbol.modifiers.contains(&modifier) {
        symbol.modifiers.push(modifier);
    }
}

/// Name and type string of one formal parameter. Comments yield `None`.
fn parameter(node: Node, source: &[u8]) -> Option<(String, String)> {
    match NodeKind::of(node) {
        NodeKind::Comment => None,
        NodeKind::RequiredParameter | NodeKind::OptionalParameter => {
            let name = node
                .child_by_field_name("pattern")
                .map(|p| pattern_name(p, source))
                .unwrap_or_default();
            let ty = node
                .child_by_field_name("type")
                .map(|t| annotation_text(t, source))
                .unwrap_or_default();
            Some((name, ty))
        }
        _ => Some((pattern_name(node, source), String::new())),
    }
}

fn pattern_name(node: Node, source: &[u8]) -> String {
    match NodeKind::of(node) {
        NodeKind::AssignmentPattern => node
            .child_by_field_name("left")
            .map(|l| pattern_name(l, source))
            .unwrap_or_default(),
        NodeKind::RestPattern => node
            .named_child(0)
            .map(|inner| pattern_name(inner, source))
            .unwrap_or_default(),
        _ => node_text(node, source).to_string(),
    }
}

/// Text of a type annotation without its leading `:`.
fn annotation_text(node: Node, source: &[u8]) -> String {
    node_text(node, source)
        .trim_start()
        .trim_start_matches(':')
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
