//! TP-020: Code generation driver.
//!
//! A [`Generator`] turns ordered graph nodes into target source text. The
//! driver owns ordering; generators own printing. Out-of-crate generators
//! matching on [`BoundNode`] must route unknown variants to
//! [`crate::il::bound::unsupported`].

pub mod legalize;
pub mod nodejs;
pub mod profile;

use crate::core::error::Result;
use crate::il::bound::BoundNode;
use crate::il::graph::{Graph, Node};
use crate::il::scheduler;
use std::io::Write;

pub use profile::FormatProfile;

/// A target-language emitter.
pub trait Generator {
    /// The version-pinned format this generator prints.
    fn profile(&self) -> FormatProfile;

    /// Whether data-source lookups are hoisted ahead of resources.
    fn prompt_data_sources(&self) -> bool;

    /// Called once before any graph, with every graph that will follow.
    fn begin(&mut self, graphs: &[Graph]) -> Result<()>;

    fn begin_module(&mut self, graph: &Graph) -> Result<()>;

    /// Emit one node. Nodes arrive in dependency order.
    fn generate_node(&mut self, graph: &Graph, node: &Node) -> Result<()>;

    fn end_module(&mut self, graph: &Graph) -> Result<()>;

    fn end(&mut self) -> Result<()> {
        Ok(())
    }

    /// Render one lowered bound tree as target-language text.
    fn compute_property(&self, node: &BoundNode) -> Result<String>;
}

/// Emit `graphs` through `generator`, in the order given.
///
/// Errors abort the call; text already written for earlier graphs stays
/// in the generator's sink.
pub fn generate(graphs: &[Graph], generator: &mut dyn Generator) -> Result<()> {
    let prompt = generator.prompt_data_sources();
    tracing::info!(
        graphs = graphs.len(),
        profile = %generator.profile(),
        prompt,
        "generating"
    );

    generator.begin(graphs)?;
    for graph in graphs {
        let order = scheduler::order(graph, prompt)?;
        generator.begin_module(graph)?;
        for id in order {
            generator.generate_node(graph, graph.node(id))?;
        }
        generator.end_module(graph)?;
    }
    generator.end()
}

pub(crate) const INDENT: &str = "    ";

/// Line writer that tracks indentation.
pub struct Emitter<W: Write> {
    sink: W,
    level: usize,
}

impl<W: Write> Emitter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, level: 0 }
    }

    /// Current indentation as text.
    pub fn indent(&self) -> String {
        INDENT.repeat(self.level)
    }

    pub fn indented(&mut self) {
        self.level += 1;
    }

    pub fn dedented(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Write `text` at the current indentation. Embedded newlines are
    /// written as-is, so multi-line text must carry its own indentation.
    pub fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.sink, "{}{}", self.indent(), text)?;
        Ok(())
    }

    pub fn blank(&mut self) -> Result<()> {
        writeln!(self.sink)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tp020_emitter_indents_lines() {
        let mut e = Emitter::new(Vec::new());
        e.line("a {").unwrap();
        e.indented();
        e.line("b;").unwrap();
        e.blank().unwrap();
        e.dedented();
        e.dedented();
        e.line("}").unwrap();
        assert_eq!(String::from_utf8(e.into_inner()).unwrap(), "a {\n    b;\n\n}\n");
    }

    #[test]
    fn test_tp020_emitter_reports_sink_errors() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut e = Emitter::new(Broken);
        let err = e.line("x").unwrap_err();
        assert!(matches!(err, crate::core::error::Error::Io(_)));
    }
}
