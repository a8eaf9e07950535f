//! Dual persistence backends: the vector store (C6, sqlite-vec) and the
//! graph store (C7, sqlx/sqlite), kept consistent across writes by a
//! durable intent log (see `vector::VectorStore`'s intent methods).

pub mod graph;
pub mod vector;

pub use graph::GraphStore;
pub use vector::VectorStore;
