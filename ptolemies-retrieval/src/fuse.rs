//! Pure score-fusion arithmetic (§4.10 step 6), isolated from I/O so it can
//! be tested against exact literal values independent of any store.

use ptolemies_core::ids::ChunkId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Balanced,
    SemanticFirst,
    GraphFirst,
}

impl Strategy {
    /// `(w_v, w_g)` per spec.
    pub fn weights(self) -> (f64, f64) {
        match self {
            Strategy::Balanced => (0.6, 0.4),
            Strategy::SemanticFirst => (0.8, 0.2),
            Strategy::GraphFirst => (0.3, 0.7),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub chunk_id: ChunkId,
    pub quality_score: f64,
    /// Cosine similarity from the vector path, if reached.
    pub sim: Option<f64>,
    /// Hop distance from the graph path, if reached (0 = direct hit).
    pub hop_distance: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FusedChunk {
    pub chunk_id: ChunkId,
    pub fused_score: f64,
    pub quality_score: f64,
    pub from_vector: bool,
    pub from_graph: bool,
}

fn graph_proximity(hop_distance: u32) -> f64 {
    1.0 / (1.0 + hop_distance as f64)
}

/// Fuses vector and graph candidate scores per `F = w_v * sim + w_g * graph_proximity`,
/// dedups by `chunk_id` (candidates are expected pre-merged, one entry per
/// chunk), sorts by `F` desc, tie-broken by `quality_score` then `chunk_id`.
pub fn fuse(candidates: Vec<CandidateScore>, strategy: Strategy) -> Vec<FusedChunk> {
    let (w_v, w_g) = strategy.weights();
    let mut fused: Vec<FusedChunk> = candidates
        .into_iter()
        .map(|c| {
            let sim = c.sim.unwrap_or(0.0);
            let proximity = c.hop_distance.map(graph_proximity).unwrap_or(0.0);
            FusedChunk {
                chunk_id: c.chunk_id,
                fused_score: w_v * sim + w_g * proximity,
                quality_score: c.quality_score,
                from_vector: c.sim.is_some(),
                from_graph: c.hop_distance.is_some(),
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.quality_score.partial_cmp(&a.quality_score).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.chunk_id.as_str().cmp(b.chunk_id.as_str()))
    });

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, sim: f64, hop: u32) -> CandidateScore {
        CandidateScore {
            chunk_id: ChunkId::from(id),
            quality_score: 0.5,
            sim: Some(sim),
            hop_distance: Some(hop),
        }
    }

    #[test]
    fn balanced_strategy_matches_literal_scenario() {
        let x = CandidateScore {
            chunk_id: ChunkId::from("x"),
            quality_score: 0.5,
            sim: Some(0.90),
            hop_distance: None,
        };
        let y = CandidateScore {
            chunk_id: ChunkId::from("y"),
            quality_score: 0.5,
            sim: Some(0.60),
            hop_distance: Some(0),
        };
        let fused = fuse(vec![x, y], Strategy::Balanced);
        let f_x = fused.iter().find(|f| f.chunk_id.as_str() == "x").unwrap().fused_score;
        let f_y = fused.iter().find(|f| f.chunk_id.as_str() == "y").unwrap().fused_score;
        assert!((f_x - 0.54).abs() < 1e-9);
        assert!((f_y - 0.76).abs() < 1e-9);
        assert_eq!(fused[0].chunk_id.as_str(), "y");
    }

    #[test]
    fn semantic_first_strategy_matches_literal_scenario() {
        let x = CandidateScore {
            chunk_id: ChunkId::from("x"),
            quality_score: 0.5,
            sim: Some(0.90),
            hop_distance: None,
        };
        let y = CandidateScore {
            chunk_id: ChunkId::from("y"),
            quality_score: 0.5,
            sim: Some(0.60),
            hop_distance: Some(0),
        };
        let fused = fuse(vec![x, y], Strategy::SemanticFirst);
        let f_x = fused.iter().find(|f| f.chunk_id.as_str() == "x").unwrap().fused_score;
        let f_y = fused.iter().find(|f| f.chunk_id.as_str() == "y").unwrap().fused_score;
        assert!((f_x - 0.72).abs() < 1e-9);
        assert!((f_y - 0.68).abs() < 1e-9);
        assert_eq!(fused[0].chunk_id.as_str(), "x");
    }

    #[test]
    fn ties_break_by_quality_then_chunk_id() {
        let a = CandidateScore {
            chunk_id: ChunkId::from("b-chunk"),
            quality_score: 0.9,
            sim: Some(0.5),
            hop_distance: None,
        };
        let b = CandidateScore {
            chunk_id: ChunkId::from("a-chunk"),
            quality_score: 0.9,
            sim: Some(0.5),
            hop_distance: None,
        };
        let fused = fuse(vec![a, b], Strategy::Balanced);
        assert_eq!(fused[0].chunk_id.as_str(), "a-chunk");
    }

    #[test]
    fn vector_only_candidate_uses_zero_proximity() {
        let fused = fuse(vec![candidate("z", 0.8, 0)], Strategy::GraphFirst);
        assert!((fused[0].fused_score - (0.3 * 0.8 + 0.7 * 1.0)).abs() < 1e-9);
    }
}
