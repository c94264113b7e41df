//! Closed mapping of tree-sitter node kinds.
//!
//! The grammars expose node kinds as strings. Everything the extractor
//! needs to recognize is mapped into [`NodeKind`] once, here, and all AST
//! dispatch elsewhere matches on the enum. Kinds the extractor does not
//! care about collapse into [`NodeKind::Other`].

use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // Declarations
    FunctionDeclaration,
    GeneratorFunctionDeclaration,
    FunctionSignature,
    AmbientDeclaration,
    ClassDeclaration,
    AbstractClassDeclaration,
    Class,
    InterfaceDeclaration,
    TypeAliasDeclaration,
    EnumDeclaration,
    LexicalDeclaration,
    VariableDeclaration,
    VariableDeclarator,
    MethodDefinition,
    MethodSignature,
    AbstractMethodSignature,
    PublicFieldDefinition,
    FieldDefinition,
    PropertySignature,
    InternalModule,
    Module,

    // Function values
    ArrowFunction,
    FunctionExpression,
    GeneratorFunction,

    // Parameters
    FormalParameters,
    RequiredParameter,
    OptionalParameter,
    AssignmentPattern,
    RestPattern,

    // Modules
    ExportStatement,
    ImportStatement,
    ImportSpecifier,
    ExportSpecifier,
    ImportClause,
    NamedImports,

    // Values
    Identifier,
    Object,
    Pair,
    ShorthandPropertyIdentifier,
    AccessibilityModifier,
    Comment,

    // Keyword tokens
    StaticKw,
    AsyncKw,
    ReadonlyKw,
    AbstractKw,
    ConstKw,
    TypeKw,
    DefaultKw,

    Other,
}

impl NodeKind {
    /// Classify a node. Keyword tokens are only recognized on anonymous
    /// nodes so a named node can never be mistaken for one.
    pub fn of(node: Node) -> Self {
        if node.is_named() {
            Self::from_named(node.kind())
        } else {
            Self::from_token(node.kind())
        }
    }

    fn from_named(kind: &str) -> Self {
        match kind {
            "function_declaration" => NodeKind::FunctionDeclaration,
            "generator_function_declaration" => NodeKind::GeneratorFunctionDeclaration,
            "function_signature" => NodeKind::FunctionSignature,
            "ambient_declaration" => NodeKind::AmbientDeclaration,
            "class_declaration" => NodeKind::ClassDeclaration,
            "abstract_class_declaration" => NodeKind::AbstractClassDeclaration,
            "class" => NodeKind::Class,
            "interface_declaration" => NodeKind::InterfaceDeclaration,
            "type_alias_declaration" => NodeKind::TypeAliasDeclaration,
            "enum_declaration" => NodeKind::EnumDeclaration,
            "lexical_declaration" => NodeKind::LexicalDeclaration,
            "variable_declaration" => NodeKind::VariableDeclaration,
            "variable_declarator" => NodeKind::VariableDeclarator,
            "method_definition" => NodeKind::MethodDefinition,
            "method_signature" => NodeKind::MethodSignature,
            "abstract_method_signature" => NodeKind::AbstractMethodSignature,
            "public_field_definition" => NodeKind::PublicFieldDefinition,
            "field_definition" => NodeKind::FieldDefinition,
            "property_signature" => NodeKind::PropertySignature,
            "internal_module" => NodeKind::InternalModule,
            "module" => NodeKind::Module,
            "arrow_function" => NodeKind::ArrowFunction,
            // Older grammar releases call function expressions `function`.
            "function_expression" | "function" => NodeKind::FunctionExpression,
            "generator_function" => NodeKind::GeneratorFunction,
            "formal_parameters" => NodeKind::FormalParameters,
            "required_parameter" => NodeKind::RequiredParameter,
            "optional_parameter" => NodeKind::OptionalParameter,
            "assignment_pattern" => NodeKind::AssignmentPattern,
            "rest_pattern" => NodeKind::RestPattern,
            "export_statement" => NodeKind::ExportStatement,
            "import_statement" => NodeKind::ImportStatement,
            "import_specifier" => NodeKind::ImportSpecifier,
            "export_specifier" => NodeKind::ExportSpecifier,
            "import_clause" => NodeKind::ImportClause,
            "named_imports" => NodeKind::NamedImports,
            "identifier" => NodeKind::Identifier,
            "object" => NodeKind::Object,
            "pair" => NodeKind::Pair,
            "shorthand_property_identifier" => NodeKind::ShorthandPropertyIdentifier,
            "accessibility_modifier" => NodeKind::AccessibilityModifier,
            "comment" => NodeKind::Comment,
            _ => NodeKind::Other,
        }
    }

    fn from_token(kind: &str) -> Self {
        match kind {
            "static" => NodeKind::StaticKw,
            "async" => NodeKind::AsyncKw,
            "readonly" => NodeKind::ReadonlyKw,
            "abstract" => NodeKind::AbstractKw,
            "const" => NodeKind::ConstKw,
            "type" => NodeKind::TypeKw,
            "default" => NodeKind::DefaultKw,
            _ => NodeKind::Other,
        }
    }

    /// Whether this node spans a complete declaration that a symbol's
    /// location should cover.
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            NodeKind::FunctionDeclaration
                | NodeKind::GeneratorFunctionDeclaration
                | NodeKind::FunctionSignature
                | NodeKind::ClassDeclaration
                | NodeKind::AbstractClassDeclaration
                | NodeKind::Class
                | NodeKind::InterfaceDeclaration
                | NodeKind::TypeAliasDeclaration
                | NodeKind::EnumDeclaration
                | NodeKind::LexicalDeclaration
                | NodeKind::VariableDeclaration
                | NodeKind::MethodDefinition
                | NodeKind::MethodSignature
                | NodeKind::AbstractMethodSignature
                | NodeKind::PublicFieldDefinition
                | NodeKind::FieldDefinition
                | NodeKind::PropertySignature
        )
    }

    /// Whether this node opens a named scope that contributes to a
    /// fully-qualified name.
    pub fn is_scope(self) -> bool {
        matches!(
            self,
            NodeKind::ClassDeclaration
                | NodeKind::AbstractClassDeclaration
                | NodeKind::Class
                | NodeKind::InterfaceDeclaration
                | NodeKind::InternalModule
                | NodeKind::Module
        )
    }

    pub fn is_function_value(self) -> bool {
        matches!(
            self,
            NodeKind::ArrowFunction | NodeKind::FunctionExpression | NodeKind::GeneratorFunction
        )
    }
}

/// The UTF-8 text of `node`, or `""` when the span is not valid UTF-8.
pub fn node_text<'s>(node: Node, source: &'s [u8]) -> &'s str {
    node.utf8_text(source).unwrap_or("")
}
