use crate::context::EngineContext;
use crate::error::CliError;
use ptolemies_store::graph::Direction;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

const NORM_TOLERANCE: f64 = 1e-5;

/// One broken invariant, with enough ids to let an operator go fix it.
#[derive(Debug)]
pub struct Violation {
    pub invariant: &'static str,
    pub detail: String,
}

/// Runs all five invariants from the data model against the live stores.
/// Returns the violations found (empty means everything holds); the caller
/// maps an empty result to exit 0 and a non-empty one to exit 5.
pub async fn run(ctx: &EngineContext) -> Result<Vec<Violation>, CliError> {
    let mut violations = Vec::new();

    let chunks = ctx.vector.all_active_chunks().await?;
    let embeddings = ctx.vector.all_embeddings().await?;
    let chunk_nodes = ctx.graph.query_by_label("chunk", usize::MAX).await?;

    let vector_chunk_ids: HashSet<String> = chunks.iter().map(|c| c.chunk_id.to_string()).collect();
    let graph_chunk_ids: HashSet<String> = chunk_nodes.iter().map(|n| n.node_id.clone()).collect();

    // Invariant 1: chunk_id parity between the vector store and the graph.
    for missing in vector_chunk_ids.difference(&graph_chunk_ids) {
        violations.push(Violation {
            invariant: "chunk_graph_parity",
            detail: format!("chunk {missing} has a vector-store row but no graph node"),
        });
    }
    for missing in graph_chunk_ids.difference(&vector_chunk_ids) {
        violations.push(Violation {
            invariant: "chunk_graph_parity",
            detail: format!("chunk {missing} has a graph node but no active vector-store row"),
        });
    }

    // Invariants 2 & 4: per-document chunk_index is exactly {0, ..., total_chunks-1}
    // with no duplicates.
    let mut by_document: BTreeMap<String, Vec<&ptolemies_core::model::Chunk>> = BTreeMap::new();
    for chunk in &chunks {
        by_document.entry(chunk.document_id.to_string()).or_default().push(chunk);
    }
    for (document_id, document_chunks) in &by_document {
        let mut indices: Vec<usize> = document_chunks.iter().map(|c| c.chunk_index).collect();
        indices.sort_unstable();
        let total_chunks = document_chunks[0].total_chunks;

        let mut seen = HashSet::new();
        for &index in &indices {
            if !seen.insert(index) {
                violations.push(Violation {
                    invariant: "no_duplicate_chunk_index",
                    detail: format!("document {document_id} has duplicate chunk_index {index}"),
                });
            }
        }

        let expected: Vec<usize> = (0..total_chunks).collect();
        let actual: Vec<usize> = seen.into_iter().collect();
        let mut actual_sorted = actual.clone();
        actual_sorted.sort_unstable();
        if actual_sorted != expected {
            violations.push(Violation {
                invariant: "contiguous_chunk_index",
                detail: format!("document {document_id} chunk_index set {actual_sorted:?} does not match 0..{total_chunks}"),
            });
        }
    }

    // Invariant 3: every embedding is L2-normalized and of the configured dimension.
    for (chunk_id, vector) in &embeddings {
        if vector.len() != ctx.config.tunables.embedding_dimension {
            violations.push(Violation {
                invariant: "embedding_dimension",
                detail: format!("chunk {chunk_id} embedding has dimension {} (expected {})", vector.len(), ctx.config.tunables.embedding_dimension),
            });
        }
        let norm: f64 = vector.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
        if (norm - 1.0).abs() >= NORM_TOLERANCE {
            violations.push(Violation {
                invariant: "embedding_normalized",
                detail: format!("chunk {chunk_id} embedding has norm {norm} (expected 1 +/- {NORM_TOLERANCE})"),
            });
        }
    }

    // Invariant 5: Source.chunk_count parity, cross-checked via the
    // source_has_chunk edges rather than a persisted counter (no separate
    // source registry is stored; see the grounding ledger).
    let vector_stats = ctx.vector.stats().await?;
    for source in &ctx.config.sources {
        let vector_count = vector_stats.per_source.get(source.source_id.as_str()).copied().unwrap_or(0);
        let graph_count = ctx
            .graph
            .neighbors(&source.source_id, Some(&["source_has_chunk".to_string()]), Direction::Outgoing, 1, usize::MAX)
            .await?
            .len();
        if vector_count != graph_count {
            violations.push(Violation {
                invariant: "source_chunk_count",
                detail: format!(
                    "source {} has {vector_count} active chunks in the vector store but {graph_count} source_has_chunk edges",
                    source.source_id
                ),
            });
        }
    }

    if !violations.is_empty() {
        warn!(count = violations.len(), "invariant violations found");
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptolemies_cache::Cache;
    use ptolemies_core::config::{EngineConfig, SourceConfig, Tunables};
    use ptolemies_core::ids::{DocumentId, SourceId};
    use ptolemies_core::model::{Category, ChunkRecord, Edge, GraphNode, Priority};
    use ptolemies_embed::{Embedder, MockEmbedder};
    use ptolemies_store::graph::GraphStore;
    use ptolemies_store::vector::VectorStore;
    use std::collections::BTreeMap as AttrMap;
    use std::sync::Arc;

    const DIM: usize = 4;

    async fn test_context(sources: Vec<SourceConfig>) -> EngineContext {
        let vector = VectorStore::open(":memory:", DIM).await.unwrap();
        let graph = GraphStore::connect("sqlite::memory:").await.unwrap();
        let embedder = Embedder::new(Arc::new(MockEmbedder::new(DIM)), 10);
        let cache = Cache::new(16).unwrap();

        EngineContext {
            config: EngineConfig {
                sources,
                tunables: Tunables {
                    embedding_dimension: DIM,
                    ..default_tunables()
                },
                embedding_api_key: None,
                vector_store_url: "sqlite://:memory:".to_string(),
                graph_store_url: "sqlite::memory:".to_string(),
                state_dir: "state".into(),
                cache_dir: "cache".into(),
                log_level: "info".to_string(),
            },
            vector: Arc::new(vector),
            graph: Arc::new(graph),
            embedder: Arc::new(embedder),
            cache: Arc::new(cache),
        }
    }

    fn default_tunables() -> Tunables {
        EngineConfig::load(None).unwrap().tunables
    }

    fn source_config(id: &str, seed: &str) -> SourceConfig {
        SourceConfig {
            source_id: id.to_string(),
            display_name: id.to_string(),
            seed_url: seed.to_string(),
            category: Category::Backend,
            priority: Priority::Medium,
            max_depth: 2,
            max_pages: 10,
            delay_ms: 0,
            respect_robots: true,
            user_agent: None,
        }
    }

    fn normalized(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in v.iter_mut() {
            *x /= norm;
        }
        v
    }

    #[tokio::test]
    async fn consistent_stores_have_no_violations() {
        let ctx = test_context(vec![source_config("fastapi", "https://fastapi.tiangolo.com/")]).await;

        let record = ChunkRecord {
            document_id: DocumentId::from("doc1".to_string()),
            source_id: SourceId::from("fastapi".to_string()),
            category: Category::Backend,
            content: "hello".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            quality_score: 0.9,
            topics: vec![],
            extraction_version: 1,
        };
        let chunk_id = record.chunk_id();
        let ids = ctx.vector.upsert_chunks(vec![record]).await.unwrap();
        assert_eq!(ids, vec![chunk_id.clone()]);

        ctx.vector
            .upsert_embedding(chunk_id.clone(), normalized(vec![1.0, 0.0, 0.0, 0.0]), "mock".to_string())
            .await
            .unwrap();

        ctx.graph
            .upsert_nodes(vec![GraphNode {
                node_id: chunk_id.to_string(),
                label: "chunk".to_string(),
                attrs: AttrMap::new(),
            }])
            .await
            .unwrap();
        ctx.graph
            .upsert_edges(vec![Edge::SourceHasChunk {
                source_id: SourceId::from("fastapi".to_string()),
                chunk_id: chunk_id.clone(),
            }])
            .await
            .unwrap();

        let violations = run(&ctx).await.unwrap();
        assert!(violations.is_empty(), "unexpected violations: {violations:?}");
    }

    #[tokio::test]
    async fn chunk_missing_graph_node_is_a_violation() {
        let ctx = test_context(vec![]).await;

        let record = ChunkRecord {
            document_id: DocumentId::from("doc1".to_string()),
            source_id: SourceId::from("fastapi".to_string()),
            category: Category::Backend,
            content: "hello".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            quality_score: 0.9,
            topics: vec![],
            extraction_version: 1,
        };
        ctx.vector.upsert_chunks(vec![record]).await.unwrap();

        let violations = run(&ctx).await.unwrap();
        assert!(violations.iter().any(|v| v.invariant == "chunk_graph_parity"));
    }
}
