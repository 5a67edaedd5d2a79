//! TP-002: Module loading from YAML declaration files.
//!
//! A module is a directory of `*.yaml` files, each with a top-level
//! `declarations:` mapping keyed by address. Leading `#` comments above a
//! declaration key are recovered from the raw text, since the YAML parser
//! drops them. Relative `source` paths on module declarations are loaded
//! recursively as child modules.

use super::types::{Declaration, DeclarationKind, ModuleTree, RawValue};
use crate::il::path;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct ModuleFile {
    #[serde(default)]
    declarations: IndexMap<String, RawValue>,
}

/// Declarations parsed from one file, plus whether every comment was located.
#[derive(Debug, Clone)]
pub struct ParsedModule {
    pub declarations: Vec<Declaration>,
    pub comments_available: bool,
}

/// Parse one module file from a string.
pub fn parse_module(yaml: &str) -> Result<ParsedModule, String> {
    let file: ModuleFile =
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))?;
    let comments = extract_comments(yaml);

    let mut comments_available = true;
    let mut declarations = Vec::with_capacity(file.declarations.len());
    for (address, value) in file.declarations {
        let mut decl = Declaration::from_address(&address, value)?;
        match comments.get(&address) {
            Some(Some(text)) => decl.comment = Some(text.clone()),
            Some(None) => {}
            None => comments_available = false,
        }
        declarations.push(decl);
    }

    Ok(ParsedModule {
        declarations,
        comments_available,
    })
}

/// Parse one module file from disk.
pub fn parse_module_file(path: &Path) -> Result<ParsedModule, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_module(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Scan raw YAML for `declarations:` keys and the comment block directly
/// above each. A located key with no comment maps to `None`.
fn extract_comments(yaml: &str) -> IndexMap<String, Option<String>> {
    let mut found = IndexMap::new();
    let mut in_section = false;
    let mut key_indent: Option<usize> = None;
    let mut pending: Vec<String> = Vec::new();

    for line in yaml.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if trimmed.is_empty() {
            pending.clear();
            continue;
        }
        if indent == 0 && !trimmed.starts_with('#') {
            in_section = trimmed.trim_end() == "declarations:";
            pending.clear();
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some(text) = trimmed.strip_prefix('#') {
            pending.push(text.strip_prefix(' ').unwrap_or(text).trim_end().to_string());
            continue;
        }

        let at_key_level = match key_indent {
            Some(k) => indent == k,
            None => {
                key_indent = Some(indent);
                true
            }
        };
        if at_key_level {
            if let Some(key) = mapping_key(trimmed) {
                let comment = if pending.is_empty() {
                    None
                } else {
                    Some(pending.join("\n"))
                };
                found.insert(key, comment);
            }
        }
        pending.clear();
    }

    found
}

/// The key of a block-style `key:` line, with surrounding quotes removed.
fn mapping_key(line: &str) -> Option<String> {
    let colon = if let Some(rest) = line.strip_prefix('"') {
        rest.find('"').map(|i| i + 2)?
    } else if let Some(rest) = line.strip_prefix('\'') {
        rest.find('\'').map(|i| i + 2)?
    } else {
        line.find(':')?
    };
    if !line[colon..].starts_with(':') {
        return None;
    }
    let key = line[..colon].trim().trim_matches('"').trim_matches('\'');
    Some(key.to_string())
}

/// Load the module rooted at `dir` and every local child module it references.
pub fn load_tree(dir: &Path, name: &str) -> Result<ModuleTree, String> {
    let mut stack = Vec::new();
    load_module(dir, name, ".", true, &mut stack)
}

fn load_module(
    dir: &Path,
    name: &str,
    rel_path: &str,
    is_root: bool,
    stack: &mut Vec<PathBuf>,
) -> Result<ModuleTree, String> {
    let canonical = dir
        .canonicalize()
        .map_err(|e| format!("cannot open module {}: {}", dir.display(), e))?;
    if stack.contains(&canonical) {
        return Err(format!(
            "module '{}' at {} includes itself",
            name,
            dir.display()
        ));
    }
    stack.push(canonical);

    let mut tree = if is_root {
        ModuleTree::root(name)
    } else {
        ModuleTree::child(name, rel_path)
    };
    tree.comments_available = true;

    for file in module_files(dir)? {
        let parsed = parse_module_file(&file)?;
        tree.comments_available &= parsed.comments_available;
        tree.declarations.extend(parsed.declarations);
    }

    for decl in &tree.declarations {
        if decl.kind != DeclarationKind::Module {
            continue;
        }
        let source = match decl.properties.get("source").and_then(RawValue::as_str) {
            Some(s) if s.starts_with("./") || s.starts_with("../") => s,
            _ => continue,
        };
        let child_rel = path::join(rel_path, source).map_err(|e| e.to_string())?;
        let child = load_module(&dir.join(source), &decl.name, &child_rel, false, stack)?;
        tree.children.push(child);
    }

    stack.pop();
    Ok(tree)
}

/// `*.yaml` and `*.yml` files directly under `dir`, sorted by file name.
fn module_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let mut files = Vec::new();
    for ext in ["yaml", "yml"] {
        let pattern = dir.join(format!("*.{}", ext));
        let pattern = pattern.to_string_lossy();
        let entries =
            glob::glob(&pattern).map_err(|e| format!("bad module path {}: {}", dir.display(), e))?;
        for entry in entries {
            files.push(entry.map_err(|e| format!("cannot list {}: {}", dir.display(), e))?);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
