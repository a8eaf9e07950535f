//! Hybrid vector+graph retrieval fusion and the four-operation query API
//! exposed to callers (C10, §6).

mod error;
pub mod fuse;

pub use error::RetrievalError;
pub use fuse::Strategy;

use fuse::{fuse, CandidateScore, FusedChunk};
use ptolemies_cache::{keys, Cache, Ttl};
use ptolemies_embed::Embedder;
use ptolemies_core::ids::ChunkId;
use ptolemies_store::graph::{Direction, GraphStore};
use ptolemies_store::vector::{SearchFilters, VectorStore};
use serde::{Deserialize, Serialize};

const GRAPH_EDGE_TYPES: &[&str] = &["integrates_with", "related_to"];
const COVERS_TOPIC: &str = "covers_topic";

#[derive(Debug, Clone)]
pub struct HybridSearchRequest {
    pub query_text: String,
    pub frameworks: Option<Vec<String>>,
    pub max_results: usize,
    pub sim_threshold: f64,
    pub depth: u32,
    pub strategy: Strategy,
}

impl Default for HybridSearchRequest {
    fn default() -> Self {
        Self {
            query_text: String::new(),
            frameworks: None,
            max_results: 10,
            sim_threshold: 0.7,
            depth: 2,
            strategy: Strategy::Balanced,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk_id: String,
    pub score: f64,
    pub quality_score: f64,
    pub from_vector: bool,
    pub from_graph: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResults {
    pub results: Vec<RankedChunk>,
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticResult {
    pub chunk_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSearchResult {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String, String)>,
}

pub struct Retrieval<'a> {
    vector: &'a VectorStore,
    graph: &'a GraphStore,
    embedder: &'a Embedder,
    cache: &'a Cache,
    lexicon: Vec<String>,
}

impl<'a> Retrieval<'a> {
    pub fn new(vector: &'a VectorStore, graph: &'a GraphStore, embedder: &'a Embedder, cache: &'a Cache, lexicon: Vec<String>) -> Self {
        Self {
            vector,
            graph,
            embedder,
            cache,
            lexicon,
        }
    }

    /// Longest-match entity extraction against the Framework/Topic lexicon
    /// (§4.10 step 3): a simple case-insensitive substring scan, preferring
    /// longer lexicon entries when one name contains another.
    fn extract_entities(&self, query_text: &str) -> Vec<String> {
        let lowered = query_text.to_lowercase();
        let mut matches: Vec<&String> = self
            .lexicon
            .iter()
            .filter(|name| lowered.contains(&name.to_lowercase()))
            .collect();
        matches.sort_by_key(|name| std::cmp::Reverse(name.len()));
        matches.into_iter().cloned().collect()
    }

    pub async fn hybrid_search(&self, request: HybridSearchRequest) -> Result<RankedResults, RetrievalError> {
        let filters_repr = request.frameworks.clone().unwrap_or_default().join(",");
        let cache_key = keys::hybrid(&request.query_text, &filters_repr, strategy_label(request.strategy));
        if let Some(hit) = self.cache.get::<RankedResults>(&cache_key) {
            return Ok(hit);
        }

        let vector_candidates = self.vector_path(&request).await;
        let graph_candidates = self.graph_path(&request).await;

        let (vector_ok, graph_ok) = (vector_candidates.is_ok(), graph_candidates.is_ok());
        if !vector_ok && !graph_ok {
            return Err(RetrievalError::BothPathsFailed);
        }

        let mut merged: std::collections::HashMap<String, CandidateScore> = std::collections::HashMap::new();
        if let Ok(vc) = &vector_candidates {
            for (chunk_id, sim) in vc {
                merged.insert(
                    chunk_id.as_str().to_string(),
                    CandidateScore {
                        chunk_id: chunk_id.clone(),
                        quality_score: 0.0,
                        sim: Some(*sim),
                        hop_distance: None,
                    },
                );
            }
        }
        if let Ok(gc) = &graph_candidates {
            for (chunk_id, hop) in gc {
                merged
                    .entry(chunk_id.as_str().to_string())
                    .and_modify(|c| c.hop_distance = Some((*hop).min(c.hop_distance.unwrap_or(u32::MAX))))
                    .or_insert_with(|| CandidateScore {
                        chunk_id: chunk_id.clone(),
                        quality_score: 0.0,
                        sim: None,
                        hop_distance: Some(*hop),
                    });
            }
        }

        let chunk_ids: Vec<ChunkId> = merged.values().map(|c| c.chunk_id.clone()).collect();
        let quality_by_id = self.quality_lookup(&chunk_ids).await;
        for candidate in merged.values_mut() {
            if let Some(q) = quality_by_id.get(candidate.chunk_id.as_str()) {
                candidate.quality_score = *q;
            }
        }

        let fused: Vec<FusedChunk> = fuse(merged.into_values().collect(), request.strategy);
        let trimmed: Vec<RankedChunk> = fused
            .into_iter()
            .take(request.max_results)
            .map(|f| RankedChunk {
                chunk_id: f.chunk_id.as_str().to_string(),
                score: f.fused_score,
                quality_score: f.quality_score,
                from_vector: f.from_vector,
                from_graph: f.from_graph,
            })
            .collect();

        let results = RankedResults {
            results: trimmed,
            partial: vector_ok != graph_ok,
        };
        self.cache.put(&cache_key, &results, Ttl::hybrid());
        Ok(results)
    }

    async fn vector_path(&self, request: &HybridSearchRequest) -> Result<Vec<(ChunkId, f64)>, RetrievalError> {
        let cache_key = keys::embedding(&request.query_text);
        let vector = match self.cache.get::<Vec<f32>>(&cache_key) {
            Some(v) => v,
            None => {
                let outcome = self.embedder.embed(&[request.query_text.clone()]).await;
                let Some(Some(v)) = outcome.vectors.into_iter().next() else {
                    return Err(RetrievalError::BothPathsFailed);
                };
                self.cache.put(&cache_key, &v, Ttl::embedding());
                v
            }
        };

        let k = (request.max_results as f64 * 2.0).ceil() as usize;
        let filters = SearchFilters {
            source_id: None,
            category: None,
            min_quality: None,
        };
        let results = self.vector.similarity_search(vector, k, filters).await?;
        Ok(results
            .into_iter()
            .filter(|(_, sim)| *sim as f64 >= request.sim_threshold)
            .map(|(id, sim)| (id, sim as f64))
            .collect())
    }

    async fn graph_path(&self, request: &HybridSearchRequest) -> Result<Vec<(ChunkId, u32)>, RetrievalError> {
        let entities = self.extract_entities(&request.query_text);
        let mut chunk_hops: std::collections::HashMap<String, u32> = std::collections::HashMap::new();

        let relation_types: Vec<String> = GRAPH_EDGE_TYPES.iter().map(|s| s.to_string()).collect();
        for entity in entities {
            let entity_id = format!("topic:{entity}");
            let mut frontier = vec![(entity_id.clone(), 0u32)];
            let related = self
                .graph
                .neighbors(&entity_id, Some(&relation_types), Direction::Both, request.depth, 100)
                .await?;
            for edge in related {
                frontier.push((edge.node_id, edge.depth));
            }

            for (node_id, hop) in frontier {
                let chunks = self
                    .graph
                    .neighbors(&node_id, Some(&[COVERS_TOPIC.to_string()]), Direction::Incoming, 1, 100)
                    .await?;
                for chunk_edge in chunks {
                    chunk_hops
                        .entry(chunk_edge.node_id)
                        .and_modify(|existing| *existing = (*existing).min(hop))
                        .or_insert(hop);
                }
            }
        }

        Ok(chunk_hops.into_iter().map(|(id, hop)| (ChunkId::from(id), hop)).collect())
    }

    async fn quality_lookup(&self, chunk_ids: &[ChunkId]) -> std::collections::HashMap<String, f64> {
        let Ok(chunks) = self.vector.get_chunks(chunk_ids.to_vec()).await else {
            return std::collections::HashMap::new();
        };
        chunks.into_iter().map(|c| (c.chunk_id.as_str().to_string(), c.quality_score)).collect()
    }

    pub async fn semantic_search(&self, query_vector: Vec<f32>, filters: SearchFilters, k: usize) -> Result<Vec<SemanticResult>, RetrievalError> {
        let results = self.vector.similarity_search(query_vector, k, filters).await?;
        Ok(results
            .into_iter()
            .map(|(chunk_id, score)| SemanticResult {
                chunk_id: chunk_id.as_str().to_string(),
                score: score as f64,
            })
            .collect())
    }

    pub async fn graph_search(&self, seed_entity: &str, edge_types: &[String], depth: u32, limit: usize) -> Result<GraphSearchResult, RetrievalError> {
        let neighbors = self.graph.neighbors(seed_entity, Some(edge_types), Direction::Both, depth, limit).await?;
        // `neighbors()` never includes the seed node itself, so at depth=0
        // (no hops) it always comes back empty; prepend the seed here or a
        // zero-depth query would report no nodes at all instead of just itself.
        let mut nodes = vec![seed_entity.to_string()];
        nodes.extend(neighbors.iter().map(|n| n.node_id.clone()));
        let edges = neighbors
            .iter()
            .map(|n| (seed_entity.to_string(), n.node_id.clone(), n.edge_type.clone()))
            .collect();
        Ok(GraphSearchResult { nodes, edges })
    }
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Balanced => "balanced",
        Strategy::SemanticFirst => "semantic_first",
        Strategy::GraphFirst => "graph_first",
    }
}
