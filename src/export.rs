//! Dependency graph export: write resource imports as Graphviz DOT or JSON.
//!
//! ```text
//! CrossReferenceIndex → export_dot() → digraph with one edge per import
//!   → pipe into `dot -Tsvg`, or diff two dumps
//! ```

use std::io::Write;
use crate::graph::ModelView;
use crate::index::CrossReferenceIndex;
use crate::model::ResourceId;
use crate::Result;

/// Export the resource import graph as a DOT digraph.
///
/// Every known resource becomes a node labelled with its URI. Each import
/// edge is labelled with its multiplicity.
pub fn export_dot(index: &CrossReferenceIndex, graph: &dyn ModelView, writer: &mut dyn Write) -> Result<()> {
    let snapshot = index.dependency_snapshot();

    writeln!(writer, "digraph imports {{")?;
    writeln!(writer, "  // resources: {}", graph.resources().len())?;
    writeln!(writer, "  // edges: {}", snapshot.edges.len())?;
    writeln!(writer, "  rankdir=LR;")?;

    for resource in graph.resources() {
        let style = if graph.is_loaded(resource) { "" } else { ", style=dashed" };
        writeln!(
            writer,
            "  {} [label={}{}];",
            resource,
            quote(graph.resource_uri(resource).unwrap_or_default()),
            style
        )?;
    }

    for edge in &snapshot.edges {
        writeln!(writer, "  {} -> {} [label=\"{}\"];", edge.importer, edge.imported, edge.count)?;
    }

    writeln!(writer, "}}")?;
    Ok(())
}

/// Export the counted import edges as pretty-printed JSON.
pub fn export_json(index: &CrossReferenceIndex, writer: &mut dyn Write) -> Result<()> {
    writer.write_all(index.dependency_snapshot().to_json()?.as_bytes())?;
    writeln!(writer)?;
    Ok(())
}

/// Sorted `(importer, imported)` pairs, for compact assertions.
pub fn import_pairs(index: &CrossReferenceIndex) -> Vec<(ResourceId, ResourceId)> {
    index
        .dependency_snapshot()
        .edges
        .iter()
        .map(|e| (e.importer, e.imported))
        .collect()
}

/// Quote a string as a DOT identifier.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
