use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use emb::config::EmbConfig;
use emb::graph::{index_nodes, Layer, NodeAccessor, NodeRef};
use emb::index::{create_index, MetadataFilter, VectorSearchResult};

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// JSON array of nodes
    #[arg(long)]
    pub input: PathBuf,
    /// Id of the query node
    #[arg(long)]
    pub node: String,
    #[arg(long, default_value = "L1")]
    pub layer: Layer,
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,
    /// flat, ivf or sqlite-vec
    #[arg(long)]
    pub backend: Option<String>,
    /// Metadata constraint, repeatable (e.g. --filter layer=L2)
    #[arg(long = "filter", value_parser = parse_filter_term)]
    pub filters: Vec<(String, serde_json::Value)>,
}

#[derive(Debug, Serialize)]
struct SearchReport {
    query: NodeRef,
    backend: String,
    results: Vec<VectorSearchResult>,
}

/// `key=value`; the value is read as JSON when it parses, else as a string.
fn parse_filter_term(term: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = term
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {term}"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Index every node of the input file and print the nearest neighbors of one.
pub async fn search(config: &EmbConfig, args: SearchArgs) -> Result<()> {
    let (nodes, accessor) = super::load_nodes(&args.input)?;
    let index_config =
        super::index_config_for(&config.index, args.backend.as_deref(), &nodes, &accessor)?;

    let query_node = NodeRef::new(args.node, args.layer);
    let query = accessor
        .features(&query_node)?
        .embedding
        .clone()
        .ok_or_else(|| anyhow!("node {query_node} has no embedding"))?;

    let filter = args
        .filters
        .into_iter()
        .fold(MetadataFilter::new(), |filter, (key, value)| filter.with(key, value));
    let top_k = args.top_k;
    let self_key = query_node.index_key();
    let backend = index_config.backend.clone();

    let results = tokio::task::spawn_blocking(move || -> Result<Vec<VectorSearchResult>> {
        let index = create_index(&index_config)?;
        index_nodes(index.as_ref(), &nodes, &accessor)?;
        let mut hits = index.search(&query, top_k.saturating_add(1), Some(&filter))?;
        hits.retain(|hit| hit.id != self_key);
        hits.truncate(top_k);
        Ok(hits)
    })
    .await
    .context("search task panicked")??;

    let report = SearchReport {
        query: query_node,
        backend,
        results,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
