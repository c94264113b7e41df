//! Type-annotation maps from type-query matches.
//!
//! A binding (variable, parameter or property) can be matched by several
//! patterns at once. Intersection types yield one type-name capture per
//! member; generics yield a base and one capture per type argument. The
//! [`TypePriority`] decides which of these competing captures names the
//! binding's type.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::QueryMatch;

/// Capture fields naming the bound identifier.
const BINDING_FIELDS: &[&str] = &["variable", "parameter", "property"];

/// A kind of type capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeSlot {
    /// A generic type argument: `User` in `Promise<User>`.
    Arg,
    /// A plain type name.
    Name,
    /// A generic base: `Promise` in `Promise<User>`.
    Base,
}

impl TypeSlot {
    fn field(self) -> &'static str {
        match self {
            TypeSlot::Arg => "arg",
            TypeSlot::Name => "name",
            TypeSlot::Base => "base",
        }
    }
}

/// Order in which competing type captures are consulted.
///
/// The default, argument then name then base, favors the most specific
/// type for call resolution. Slots missing from a configured order are
/// appended in default order; duplicates are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePriority(Vec<TypeSlot>);

impl TypePriority {
    pub const DEFAULT_ORDER: [TypeSlot; 3] = [TypeSlot::Arg, TypeSlot::Name, TypeSlot::Base];

    pub fn new(order: &[TypeSlot]) -> Self {
        let mut slots: Vec<TypeSlot> = Vec::with_capacity(3);
        for slot in order.iter().chain(Self::DEFAULT_ORDER.iter()) {
            if !slots.contains(slot) {
                slots.push(*slot);
            }
        }
        Self(slots)
    }

    pub fn slots(&self) -> &[TypeSlot] {
        &self.0
    }
}

impl Default for TypePriority {
    fn default() -> Self {
        Self(Self::DEFAULT_ORDER.to_vec())
    }
}

impl fmt::Display for TypePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|s| s.field()).collect();
        f.write_str(&names.join(" > "))
    }
}

#[derive(Default)]
struct Candidates {
    binding: String,
    start: usize,
    by_slot: HashMap<TypeSlot, Vec<String>>,
}

impl Candidates {
    fn pick(&self, priority: &TypePriority) -> Option<&str> {
        priority
            .slots()
            .iter()
            .find_map(|slot| self.by_slot.get(slot).and_then(|v| v.first()))
            .map(String::as_str)
    }
}

/// Build the binding-name to type-name map.
///
/// Captures are pooled per binding node across matches before the
/// priority is applied. When the same name is bound more than once in a
/// file, the first binding in source order wins.
pub fn build_type_map(
    matches: &[QueryMatch<'_, '_>],
    priority: &TypePriority,
) -> BTreeMap<String, String> {
    let mut bindings: HashMap<(usize, usize), Candidates> = HashMap::new();

    for m in matches {
        let Some(binding) = m.first_of(BINDING_FIELDS) else {
            continue;
        };
        let key = (binding.node.start_byte(), binding.node.end_byte());
        let entry = bindings.entry(key).or_insert_with(|| Candidates {
            binding: binding.text.clone(),
            start: key.0,
            ..Default::default()
        });
        for capture in &m.captures {
            let slot = match capture.field {
                "arg" => TypeSlot::Arg,
                "name" => TypeSlot::Name,
                "base" => TypeSlot::Base,
                _ => continue,
            };
            let texts = entry.by_slot.entry(slot).or_default();
            if !texts.contains(&capture.text) {
                texts.push(capture.text.clone());
            }
        }
    }

    let mut ordered: Vec<Candidates> = bindings.into_values().collect();
    ordered.sort_by_key(|c| c.start);

    let mut types = BTreeMap::new();
    for candidates in &ordered {
        if candidates.binding.is_empty() || types.contains_key(&candidates.binding) {
            continue;
        }
        if let Some(ty) = candidates.pick(priority) {
            types.insert(candidates.binding.clone(), ty.to_string());
        }
    }
    types
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Lang;
    use crate::parser::ParserManager;
    use crate::query::{QueryKind, QueryManager};

    fn types_with(src: &str, lang: Lang, priority: &TypePriority) -> BTreeMap<String, String> {
        let parsers = ParserManager::new(1);
        let queries = QueryManager::new();
        let tree = parsers.parse(src.as_bytes(), lang, false).unwrap();
        let q = queries
            .get_query(tree.grammar(), QueryKind::TypeAnnotations)
            .unwrap();
        let matches = q.execute(&tree, src.as_bytes()).unwrap();
        build_type_map(&matches, priority)
    }

    fn ts(src: &str) -> BTreeMap<String, String> {
        types_with(src, Lang::TypeScript, &TypePriority::default())
    }

    #[test]
    fn priority_normalizes_order() {
        let p = TypePriority::new(&[TypeSlot::Base, TypeSlot::Base]);
        assert_eq!(p.slots(), &[TypeSlot::Base, TypeSlot::Arg, TypeSlot::Name]);
        assert_eq!(TypePriority::default().to_string(), "arg > name > base");
    }

    #[test]
    fn plain_annotations() {
        let types = ts("const user: User = load();\nlet count: number = 0;\n");
        assert_eq!(types.get("user").map(String::as_str), Some("User"));
        assert_eq!(types.get("count").map(String::as_str), Some("number"));
    }

    #[test]
    fn generic_prefers_argument_by_default() {
        let types = ts("const repo: Repository<User> = make();\n");
        assert_eq!(types.get("repo").map(String::as_str), Some("User"));
    }

    #[test]
    fn generic_base_when_configured_first() {
        let priority = TypePriority::new(&[TypeSlot::Base]);
        let types = types_with(
            "const repo: Repository<User> = make();\n",
            Lang::TypeScript,
            &priority,
        );
        assert_eq!(types.get("repo").map(String::as_str), Some("Repository"));
    }

    #[test]
    fn intersection_takes_first_member() {
        let types = ts("let both: Admin & Auditor = x;\n");
        assert_eq!(types.get("both").map(String::as_str), Some("Admin"));
    }

    #[test]
    fn parameters_and_properties() {
        let src = r#"
class Service {
  name: string;
  constructor(repo: Repository<Order>, limit?: number) {}
}
"#;
        let types = ts(src);
        assert_eq!(types.get("name").map(String::as_str), Some("string"));
        assert_eq!(types.get("repo").map(String::as_str), Some("Order"));
        assert_eq!(types.get("limit").map(String::as_str), Some("number"));
    }

    #[test]
    fn constructor_calls_pin_types() {
        let types = ts("const svc = new UserService();\n");
        assert_eq!(types.get("svc").map(String::as_str), Some("UserService"));

        let types = types_with(
            "const emitter = new EventEmitter();\nconst n = 1;\n",
            Lang::JavaScript,
            &TypePriority::default(),
        );
        assert_eq!(types.len(), 1);
        assert_eq!(types.get("emitter").map(String::as_str), Some("EventEmitter"));
    }

    #[test]
    fn first_binding_of_a_name_wins() {
        let types = ts("function a(x: string) {}\nfunction b(x: number) {}\n");
        assert_eq!(types.get("x").map(String::as_str), Some("string"));
    }

    #[test]
    fn untyped_bindings_are_absent() {
        let types = ts("const plain = 1;\nfunction f(y) {}\n");
        assert!(types.is_empty());
    }
}
