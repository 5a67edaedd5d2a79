//! TP-021: Identifier legalization and per-module name assignment.

use crate::il::graph::{Graph, NodeId, NodeKind};
use crate::il::schema::camel_case;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

fn is_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

pub fn is_legal_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Turn any string into a legal identifier.
///
/// An illegal first character becomes a `_` prefix (kept after it when it is
/// a digit); every later illegal character becomes `_`.
pub fn legalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_start(c) => out.push(c),
        Some(c) => {
            out.push('_');
            if is_part(c) {
                out.push(c);
            }
        }
        None => out.push('_'),
    }
    for c in chars {
        out.push(if is_part(c) { c } else { '_' });
    }
    out
}

/// Names that generated code declares at module scope.
pub const RESERVED: &[&str] = &[
    "config", "pulumi", "fs", "process", "Math", "mod_args", "mod_name", "i",
];

/// ECMAScript and TypeScript reserved words, never usable as a binding name.
pub const KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield", "let", "static",
    "implements", "interface", "package", "private", "protected", "public", "await",
];

/// Unique identifiers for every node of one graph.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    taken: FxHashSet<String>,
    names: FxHashMap<NodeId, String>,
}

impl NameTable {
    /// Assign names in declaration order. `reserved` are names already
    /// in scope, such as imported package aliases.
    pub fn for_graph<'a>(graph: &Graph, reserved: impl IntoIterator<Item = &'a str>) -> Self {
        let mut table = Self::default();
        table
            .taken
            .extend(RESERVED.iter().chain(KEYWORDS).copied().chain(reserved).map(str::to_string));
        for node in &graph.nodes {
            let base = match &node.kind {
                NodeKind::Provider(p) => match &p.alias {
                    Some(alias) => legalize(&camel_case(&format!("{}_{}", node.name, alias))),
                    None => legalize(&node.name),
                },
                _ => legalize(&node.name),
            };
            let name = table.claim(&base, suffix(&node.kind));
            table.names.insert(node.id, name);
        }
        table
    }

    fn claim(&mut self, base: &str, suffix: &str) -> String {
        let mut candidate = base.to_string();
        if self.taken.contains(&candidate) {
            candidate = format!("{}{}", base, suffix);
            let mut n = 2;
            while self.taken.contains(&candidate) {
                candidate = format!("{}{}{}", base, suffix, n);
                n += 1;
            }
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    pub fn get(&self, id: NodeId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }
}

fn suffix(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::Resource(r) if r.data_source => "Data",
        NodeKind::Resource(_) => "Resource",
        NodeKind::Variable(_) => "Input",
        NodeKind::Local => "Local",
        NodeKind::Output => "Output",
        NodeKind::Provider(_) => "Provider",
        NodeKind::Module(_) => "Module",
    }
}
