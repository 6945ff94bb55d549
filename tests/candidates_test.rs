mod helpers;

use helpers::embedded_nodes;

use emb::graph::{
    build_candidate_edges, build_similarity_edges, index_nodes, BuildEdgesConfig,
    EmbeddingSimilarity, MirrorWeight,
};
use emb::index::{FlatIndex, IndexMetric, SqliteVecIndex, VectorIndex};

fn assert_matches_exact(index: &dyn VectorIndex, config: &BuildEdgesConfig) {
    let (nodes, accessor) = embedded_nodes(20, 8);
    let metric = EmbeddingSimilarity::cosine();
    let spec = emb::graph::SimilarityMetric::spec(&metric);

    assert_eq!(index_nodes(index, &nodes, &accessor).unwrap(), nodes.len());

    let exact = build_similarity_edges(&nodes, &metric, Some(&spec), &accessor, config).unwrap();
    let approx = build_candidate_edges(
        &nodes,
        &metric,
        Some(&spec),
        &accessor,
        index,
        config,
        nodes.len() - 1,
    )
    .unwrap();
    assert_eq!(exact, approx, "{}", index.backend());
}

#[test]
fn flat_candidates_reproduce_exact_top_k() {
    let index = FlatIndex::new(8, IndexMetric::InnerProduct).unwrap();
    assert_matches_exact(&index, &BuildEdgesConfig::new("similar").with_top_k(3));
}

#[test]
fn sqlite_vec_candidates_reproduce_exact_threshold() {
    let index = SqliteVecIndex::in_memory(8).unwrap();
    let config = BuildEdgesConfig::new("similar")
        .with_min_similarity(0.2)
        .with_mirror(MirrorWeight::Recompute);
    assert_matches_exact(&index, &config);
}

#[test]
fn small_candidate_sets_bound_out_degree() {
    let (nodes, accessor) = embedded_nodes(20, 8);
    let index = FlatIndex::new(8, IndexMetric::InnerProduct).unwrap();
    index_nodes(&index, &nodes, &accessor).unwrap();

    let config = BuildEdgesConfig::new("similar")
        .with_min_similarity(-1.0)
        .directed(true);
    let edges = build_candidate_edges(
        &nodes,
        &EmbeddingSimilarity::cosine(),
        None,
        &accessor,
        &index,
        &config,
        2,
    )
    .unwrap();

    for node in &nodes {
        let out = edges.iter().filter(|e| &e.src == node).count();
        assert!(out <= 2, "{node} has {out} outbound edges");
    }
    assert!(edges.iter().all(|e| e.src != e.dst));
}

#[test]
fn unbounded_candidate_count_matches_exact() {
    let (nodes, accessor) = embedded_nodes(10, 8);
    let index = FlatIndex::new(8, IndexMetric::InnerProduct).unwrap();
    index_nodes(&index, &nodes, &accessor).unwrap();

    let metric = EmbeddingSimilarity::cosine();
    let config = BuildEdgesConfig::new("similar").with_top_k(2);
    let exact = build_similarity_edges(&nodes, &metric, None, &accessor, &config).unwrap();
    let approx =
        build_candidate_edges(&nodes, &metric, None, &accessor, &index, &config, usize::MAX)
            .unwrap();
    assert_eq!(exact, approx);
}
