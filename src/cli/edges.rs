use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use emb::config::EmbConfig;
use emb::graph::{
    build_candidate_edges, build_similarity_edges, index_nodes, BuildEdgesConfig, Edge,
    MetricSpec, MirrorWeight,
};
use emb::index::create_index;

#[derive(Debug, Args)]
pub struct EdgesArgs {
    /// JSON array of nodes
    #[arg(long)]
    pub input: PathBuf,
    /// lexical, cosine, dot or temporal
    #[arg(long)]
    pub metric: Option<String>,
    #[arg(long)]
    pub top_k: Option<usize>,
    #[arg(long)]
    pub min_similarity: Option<f64>,
    #[arg(long)]
    pub directed: bool,
    #[arg(long)]
    pub edge_type: Option<String>,
    /// Weight mirrored edges with the reverse score
    #[arg(long)]
    pub recompute_mirror: bool,
    /// Score rows on all cores
    #[arg(long)]
    pub parallel: bool,
    /// Use a vector index and rescore this many candidates per node
    #[arg(long)]
    pub candidates: Option<usize>,
    /// Index backend for --candidates: flat, ivf or sqlite-vec
    #[arg(long)]
    pub backend: Option<String>,
}

#[derive(Debug, Serialize)]
struct EdgeReport {
    generated_at: DateTime<Utc>,
    metric: MetricSpec,
    node_count: usize,
    edges: Vec<Edge>,
}

/// Flags win over the `[graph]` section; boolean flags can only switch on.
fn build_config(config: &EmbConfig, args: &EdgesArgs) -> BuildEdgesConfig {
    let mut build = config.graph.to_build_config();
    if let Some(edge_type) = &args.edge_type {
        build.edge_type = edge_type.clone();
    }
    if args.top_k.is_some() || args.min_similarity.is_some() {
        build.top_k = args.top_k;
        build.min_similarity = args.min_similarity;
    }
    build.directed |= args.directed;
    build.parallel |= args.parallel;
    if args.recompute_mirror {
        build.mirror = MirrorWeight::Recompute;
    }
    build
}

/// Build similarity edges for a node file and print them as JSON.
pub async fn edges(config: &EmbConfig, args: EdgesArgs) -> Result<()> {
    let build = build_config(config, &args);
    build
        .validate()
        .context("pass --top-k or --min-similarity, or set one in [graph]")?;

    let (nodes, accessor) = super::load_nodes(&args.input)?;
    let kind = args.metric.as_deref().unwrap_or(&config.metric.kind);
    let metric = super::metric_from_config(kind, &config.metric)?;
    let spec = metric.spec();

    let index_config = match args.candidates {
        Some(_) => Some(super::index_config_for(
            &config.index,
            args.backend.as_deref(),
            &nodes,
            &accessor,
        )?),
        None => None,
    };
    let candidates = args.candidates;

    let node_count = nodes.len();
    let metric_spec = spec.clone();
    let edges = tokio::task::spawn_blocking(move || -> Result<Vec<Edge>> {
        let edges = match (candidates, index_config) {
            (Some(per_node), Some(index_config)) => {
                let index = create_index(&index_config)?;
                index_nodes(index.as_ref(), &nodes, &accessor)?;
                build_candidate_edges(
                    &nodes,
                    metric.as_ref(),
                    Some(&metric_spec),
                    &accessor,
                    index.as_ref(),
                    &build,
                    per_node,
                )?
            }
            _ => build_similarity_edges(
                &nodes,
                metric.as_ref(),
                Some(&metric_spec),
                &accessor,
                &build,
            )?,
        };
        Ok(edges)
    })
    .await
    .context("edge build task panicked")??;

    let report = EdgeReport {
        generated_at: Utc::now(),
        metric: spec,
        node_count,
        edges,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    eprintln!("Built {} edges over {} nodes.", report.edges.len(), report.node_count);
    Ok(())
}
