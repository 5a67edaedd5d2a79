//! TP-012: Path resolution for `path.module` and `path.root`.
//!
//! All joins are lexical and forward-slash separated so generated code is
//! identical on every host. Backslashes in input are treated as separators.

use super::bound::PathKind;
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segments {
    absolute: bool,
    parts: Vec<String>,
}

impl Segments {
    fn parse(p: &str) -> Self {
        let absolute = p.starts_with('/') || p.starts_with('\\');
        let mut parts: Vec<String> = Vec::new();
        for seg in p.split(['/', '\\']) {
            match seg {
                "" | "." => {}
                ".." => match parts.last() {
                    Some(last) if last != ".." => {
                        parts.pop();
                    }
                    _ if absolute => {}
                    _ => parts.push("..".to_string()),
                },
                other => parts.push(other.to_string()),
            }
        }
        Self { absolute, parts }
    }

    fn render(&self) -> String {
        let body = self.parts.join("/");
        match (self.absolute, body.is_empty()) {
            (true, _) => format!("/{}", body),
            (false, true) => ".".to_string(),
            (false, false) => body,
        }
    }
}

/// Lexically clean a path: collapse `.`, resolve `..`, use `/` separators.
pub fn normalize(p: &str) -> String {
    Segments::parse(p).render()
}

/// Join `rel` onto `base`. An absolute `rel` replaces `base`.
pub fn join(base: &str, rel: &str) -> Result<String> {
    if rel.starts_with('/') {
        return Ok(normalize(rel));
    }
    Ok(normalize(&format!("{}/{}", base, rel)))
}

/// The path that leads from directory `from` to `to`.
pub fn relative(from: &str, to: &str) -> Result<String> {
    let from = Segments::parse(from);
    let to = Segments::parse(to);
    if from.absolute != to.absolute {
        return Err(Error::Path(format!(
            "cannot relate '{}' to '{}'",
            from.render(),
            to.render()
        )));
    }

    let common = from
        .parts
        .iter()
        .zip(&to.parts)
        .take_while(|(a, b)| a == b)
        .count();
    if from.parts[common..].iter().any(|p| p == "..") {
        return Err(Error::Path(format!(
            "cannot find '{}' from '{}'",
            to.render(),
            from.render()
        )));
    }

    let mut parts: Vec<String> = vec!["..".to_string(); from.parts.len() - common];
    parts.extend(to.parts[common..].iter().cloned());
    Ok(Segments {
        absolute: false,
        parts,
    }
    .render())
}

/// Where a graph sits relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    /// Project root, as seen from the working directory
    pub root_path: String,

    /// Originating module path, as seen from the working directory
    pub module_path: String,

    pub is_root: bool,
}

impl PathContext {
    pub fn new(root_path: &str, module_path: &str, is_root: bool) -> Self {
        Self {
            root_path: root_path.to_string(),
            module_path: module_path.to_string(),
            is_root,
        }
    }

    /// Statically resolve a path variable. `path.cwd` is only known at run
    /// time and yields `None`.
    pub fn resolve(&self, kind: PathKind) -> Result<Option<String>> {
        match kind {
            PathKind::Module => relative(&self.root_path, &self.module_path).map(Some),
            PathKind::Root if self.is_root => Ok(Some(".".to_string())),
            PathKind::Root => relative(&self.module_path, &self.root_path).map(Some),
            PathKind::Cwd => Ok(None),
        }
    }
}
