//! Content-addressed identifiers for the data model.
//!
//! Source ids are operator-chosen slugs; everything downstream of a Source is
//! derived by hashing its parent identity plus a distinguishing field, so two
//! engines fed the same inputs always agree on ids without coordination.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

newtype_id!(SourceId);
newtype_id!(DocumentId);
newtype_id!(ChunkId);
newtype_id!(EmbeddingId);

fn hash_fields(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex().to_string()
}

impl DocumentId {
    /// `document_id = hash(source_id, canonical_url)` per the data model.
    pub fn derive(source_id: &SourceId, canonical_url: &str) -> Self {
        Self(hash_fields(&[source_id.as_str(), canonical_url]))
    }
}

impl ChunkId {
    /// `chunk_id = hash(document_id, chunk_index)` per the data model.
    pub fn derive(document_id: &DocumentId, chunk_index: usize) -> Self {
        Self(hash_fields(&[document_id.as_str(), &chunk_index.to_string()]))
    }
}

impl EmbeddingId {
    pub fn derive(chunk_id: &ChunkId, model_name: &str) -> Self {
        Self(hash_fields(&[chunk_id.as_str(), model_name]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_deterministic() {
        let s = SourceId::from("fastapi");
        let a = DocumentId::derive(&s, "https://fastapi.tiangolo.com/");
        let b = DocumentId::derive(&s, "https://fastapi.tiangolo.com/");
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_id_differs_by_index() {
        let s = SourceId::from("fastapi");
        let d = DocumentId::derive(&s, "https://fastapi.tiangolo.com/");
        let c0 = ChunkId::derive(&d, 0);
        let c1 = ChunkId::derive(&d, 1);
        assert_ne!(c0, c1);
    }
}
