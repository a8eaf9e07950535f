//! Core domain types shared by every crate: Source, Document, Chunk,
//! Embedding, Framework, Topic, and the typed graph edges between them.

use crate::ids::{ChunkId, DocumentId, EmbeddingId, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Backend,
    Frontend,
    Database,
    Tool,
    Library,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Backend => "backend",
            Category::Frontend => "frontend",
            Category::Database => "database",
            Category::Tool => "tool",
            Category::Library => "library",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backend" => Some(Category::Backend),
            "frontend" => Some(Category::Frontend),
            "database" => Some(Category::Database),
            "tool" => Some(Category::Tool),
            "library" => Some(Category::Library),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlPolicy {
    pub max_depth: u32,
    pub max_pages: u32,
    pub delay_ms: u64,
    #[serde(default = "default_true")]
    pub respect_robots: bool,
    pub user_agent: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 500,
            delay_ms: 1000,
            respect_robots: true,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: SourceId,
    pub display_name: String,
    pub seed_url: String,
    pub category: Category,
    pub priority: Priority,
    pub crawl_policy: CrawlPolicy,
    pub chunk_count: u64,
    pub avg_quality: f64,
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl Source {
    pub fn new(
        source_id: impl Into<SourceId>,
        display_name: impl Into<String>,
        seed_url: impl Into<String>,
        category: Category,
        priority: Priority,
        crawl_policy: CrawlPolicy,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            display_name: display_name.into(),
            seed_url: seed_url.into(),
            category,
            priority,
            crawl_policy,
            chunk_count: 0,
            avg_quality: 0.0,
            last_crawled_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,
    pub source_id: SourceId,
    pub url: String,
    pub title: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub http_status: u16,
    pub content_hash: String,
    pub extraction_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub source_id: SourceId,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub char_length: usize,
    pub quality_score: f64,
    pub topics: Vec<String>,
    pub embedding_id: Option<EmbeddingId>,
    pub extraction_version: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn char_len_matches(&self) -> bool {
        self.char_length == self.content.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub embedding_id: EmbeddingId,
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
    pub model_name: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
}

impl Embedding {
    /// Invariant 2 of §3: `‖vector‖₂ ≈ 1`.
    pub fn is_normalized(&self) -> bool {
        let norm: f32 = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() < 1e-4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Framework {
    pub framework_name: String,
    pub category: Category,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic_name: String,
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    Native,
    Plugin,
    Adapter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicRelationKind {
    Parent,
    Sibling,
    Prerequisite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "edge_type")]
pub enum Edge {
    Documents {
        source_id: SourceId,
        framework_name: String,
    },
    HasChunk {
        document_id: DocumentId,
        chunk_id: ChunkId,
    },
    SourceHasChunk {
        source_id: SourceId,
        chunk_id: ChunkId,
    },
    CoversTopic {
        chunk_id: ChunkId,
        topic_name: String,
        weight: f64,
    },
    IntegratesWith {
        from: String,
        to: String,
        kind: IntegrationKind,
    },
    RelatedTo {
        from: String,
        to: String,
        kind: TopicRelationKind,
    },
}

impl Edge {
    /// Flattens a typed edge into the generic `(src, dst, edge_type, weight,
    /// attrs)` row shape the graph store persists.
    pub fn decompose(&self) -> (String, String, &'static str, f64, serde_json::Value) {
        match self {
            Edge::Documents {
                source_id,
                framework_name,
            } => (
                source_id.to_string(),
                format!("framework:{framework_name}"),
                "documents",
                1.0,
                serde_json::json!({}),
            ),
            Edge::HasChunk {
                document_id,
                chunk_id,
            } => (
                document_id.to_string(),
                chunk_id.to_string(),
                "has_chunk",
                1.0,
                serde_json::json!({}),
            ),
            Edge::SourceHasChunk {
                source_id,
                chunk_id,
            } => (
                source_id.to_string(),
                chunk_id.to_string(),
                "source_has_chunk",
                1.0,
                serde_json::json!({}),
            ),
            Edge::CoversTopic {
                chunk_id,
                topic_name,
                weight,
            } => (
                chunk_id.to_string(),
                format!("topic:{topic_name}"),
                "covers_topic",
                *weight,
                serde_json::json!({}),
            ),
            Edge::IntegratesWith { from, to, kind } => (
                from.clone(),
                to.clone(),
                "integrates_with",
                1.0,
                serde_json::json!({ "kind": kind }),
            ),
            Edge::RelatedTo { from, to, kind } => (
                from.clone(),
                to.clone(),
                "related_to",
                1.0,
                serde_json::json!({ "kind": kind }),
            ),
        }
    }
}

/// A node as stored in the graph backend: a labeled, attribute-bearing
/// identity. Label distinguishes Framework/Topic/Document/Chunk/Source nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: String,
    pub label: String,
    pub attrs: BTreeMap<String, serde_json::Value>,
}

/// A fragment ready to persist, produced by the Chunker/Scorer stages and
/// consumed by the Vector Store. Distinct from `Chunk` (the model type)
/// because it carries no identity yet — the store assigns `chunk_id` from
/// `(document_id, chunk_index)` on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: DocumentId,
    pub source_id: SourceId,
    /// Denormalized from the owning Source so the vector store can apply
    /// the `category` filter (§4.6) without a cross-store join.
    pub category: Category,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub quality_score: f64,
    pub topics: Vec<String>,
    pub extraction_version: u32,
}

impl ChunkRecord {
    pub fn chunk_id(&self) -> ChunkId {
        ChunkId::derive(&self.document_id, self.chunk_index)
    }
}
