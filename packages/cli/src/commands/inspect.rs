use crate::config::Config;
use crate::document_file::DocumentFile;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use massing_document::Document;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Document file to inspect
    pub document: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: i32,
    pub kind: String,
    pub vertices: usize,
    pub edges: usize,
    pub faces: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub hash: u32,
    pub root_group_id: i32,
    pub graphs: Vec<GraphSummary>,
    pub objects_by_kind: BTreeMap<&'static str, usize>,
    pub objects_by_type: BTreeMap<String, usize>,
    pub symbols: usize,
}

impl Summary {
    pub fn of(document: &Document) -> Self {
        let state = document.state();
        let graphs = state
            .graphs()
            .values()
            .map(|graph| {
                let (vertices, edges, faces) = graph.counts();
                GraphSummary {
                    id: graph.id(),
                    kind: format!("{:?}", graph.kind()),
                    vertices,
                    edges,
                    faces,
                }
            })
            .collect();

        let mut objects_by_kind = BTreeMap::new();
        let mut objects_by_type = BTreeMap::new();
        for object in state.objects().values() {
            *objects_by_kind.entry(object.kind.name()).or_insert(0) += 1;
            *objects_by_type.entry(object.type_tag.clone()).or_insert(0) += 1;
        }

        Self {
            hash: document.hash(),
            root_group_id: document.root_group_id(),
            graphs,
            objects_by_kind,
            objects_by_type,
            symbols: state.symbols().len(),
        }
    }
}

pub fn inspect(args: InspectArgs, config: &Config) -> Result<()> {
    let file = DocumentFile::read(&args.document)?;
    // Opening runs the full invariant check
    let document = file.open(&config.document)?;
    let summary = Summary::of(&document);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} {}", "Document".cyan().bold(), args.document.display());
    println!("  hash  {}", format!("{:#010x}", summary.hash).yellow());
    println!("  root  {}", summary.root_group_id);
    println!();

    println!("{}", "Graphs".bold());
    for graph in &summary.graphs {
        println!(
            "  {:>6} {:<8} {} vertices, {} edges, {} faces",
            graph.id, graph.kind, graph.vertices, graph.edges, graph.faces
        );
    }
    println!();

    println!("{}", "Objects".bold());
    for (kind, count) in &summary.objects_by_kind {
        println!("  {:<16} {}", kind, count);
    }
    for (tag, count) in &summary.objects_by_type {
        println!("  {:<16} {}", tag.dimmed(), count);
    }
    println!("  symbols          {}", summary.symbols);
    println!();
    println!("{} invariants hold", "✓".green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use massing_common::point;
    use massing_document::{Context, DocumentConfig};

    #[test]
    fn test_summary_counts_graph_and_wrappers() {
        let ctx = Context::default();
        let mut document = Document::new(0, DocumentConfig::default()).unwrap();
        let root = document.root_group_id();
        document
            .add_edge(&ctx, root, point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0))
            .unwrap();

        let summary = Summary::of(&document);
        assert_eq!(summary.graphs.len(), 1);
        assert_eq!(summary.graphs[0].vertices, 2);
        assert_eq!(summary.graphs[0].edges, 1);
        assert_eq!(summary.objects_by_kind.get("graph element"), Some(&3));
        assert_eq!(summary.objects_by_kind.get("group"), Some(&1));
        assert_eq!(summary.hash, document.hash());
    }
}
