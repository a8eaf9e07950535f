//! Per-source checkpoint persistence: one JSON file under `state/<source_id>.ckpt`,
//! written atomically (write-to-temp + rename), generalizing the teacher's
//! single-`HashSet` `ResumeTracker` to the full frontier/visited/counters
//! schema.

use crate::error::SupervisorError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub fetched: u64,
    pub not_modified: u64,
    pub failed_permanent: u64,
    pub failed_transient: u64,
    pub chunks_produced: u64,
    pub chunks_stored: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub visited: HashSet<String>,
    /// `(depth, url)` pairs, in BFS discovery order.
    pub frontier: Vec<(u32, String)>,
    pub document_hashes: HashMap<String, String>,
    pub counters: Counters,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Checkpoint {
    pub fn new(seed_url: &str) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            visited: HashSet::new(),
            frontier: vec![(0, seed_url.to_string())],
            document_hashes: HashMap::new(),
            counters: Counters::default(),
            updated_at: chrono::Utc::now(),
        }
    }
}

pub fn checkpoint_path(state_dir: &Path, source_id: &str) -> PathBuf {
    state_dir.join(format!("{source_id}.ckpt"))
}

/// Loads the checkpoint for `source_id`, or a fresh one seeded at `seed_url`
/// if none exists yet.
pub async fn load(state_dir: &Path, source_id: &str, seed_url: &str) -> Result<Checkpoint, SupervisorError> {
    let path = checkpoint_path(state_dir, source_id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| SupervisorError::CheckpointParse { path, source }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(Checkpoint::new(seed_url)),
        Err(source) => Err(SupervisorError::CheckpointRead { path, source }),
    }
}

/// Persists `checkpoint` to `state/<source_id>.ckpt` via a temp-file write
/// followed by an atomic rename, so a crash mid-write never corrupts the
/// prior checkpoint.
pub async fn save(state_dir: &Path, source_id: &str, checkpoint: &Checkpoint) -> Result<(), SupervisorError> {
    tokio::fs::create_dir_all(state_dir)
        .await
        .map_err(|source| SupervisorError::CheckpointWrite {
            path: state_dir.to_path_buf(),
            source,
        })?;

    let path = checkpoint_path(state_dir, source_id);
    let tmp_path = state_dir.join(format!("{source_id}.ckpt.tmp"));
    let bytes = serde_json::to_vec_pretty(checkpoint).expect("Checkpoint serialization never fails");

    tokio::fs::write(&tmp_path, &bytes)
        .await
        .map_err(|source| SupervisorError::CheckpointWrite { path: tmp_path.clone(), source })?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|source| SupervisorError::CheckpointWrite { path, source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_checkpoint_yields_fresh_seed() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = load(dir.path(), "fastapi", "https://fastapi.tiangolo.com/").await.unwrap();
        assert_eq!(checkpoint.frontier, vec![(0, "https://fastapi.tiangolo.com/".to_string())]);
        assert!(checkpoint.visited.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::new("https://fastapi.tiangolo.com/");
        checkpoint.visited.insert("https://fastapi.tiangolo.com/".to_string());
        checkpoint.counters.fetched = 1;
        save(dir.path(), "fastapi", &checkpoint).await.unwrap();

        let reloaded = load(dir.path(), "fastapi", "https://fastapi.tiangolo.com/").await.unwrap();
        assert_eq!(reloaded.visited.len(), 1);
        assert_eq!(reloaded.counters.fetched, 1);
    }

    #[tokio::test]
    async fn save_is_atomic_no_tmp_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new("https://fastapi.tiangolo.com/");
        save(dir.path(), "fastapi", &checkpoint).await.unwrap();
        assert!(!dir.path().join("fastapi.ckpt.tmp").exists());
        assert!(dir.path().join("fastapi.ckpt").exists());
    }
}
