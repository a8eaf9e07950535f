//! Typed node/edge graph store over `sqlx`/SQLite (C7).

mod error;

pub use error::GraphError;

use chrono::Utc;
use ptolemies_core::model::{Edge, GraphNode};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone)]
pub struct NeighborEdge {
    pub node_id: String,
    pub edge_type: String,
    pub weight: f64,
    pub depth: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub n_nodes: usize,
    pub n_edges: usize,
    pub per_label: BTreeMap<String, usize>,
    pub per_type: BTreeMap<String, usize>,
}

pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    pub async fn connect(database_url: &str) -> Result<Self, GraphError> {
        let pool = SqlitePool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn upsert_nodes(&self, nodes: Vec<GraphNode>) -> Result<(), GraphError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for node in nodes {
            let attrs_json = serde_json::to_string(&node.attrs)?;
            sqlx::query(
                "INSERT INTO nodes (node_id, label, attrs_json, active, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT(node_id) DO UPDATE SET label = excluded.label, attrs_json = excluded.attrs_json, active = 1",
            )
            .bind(&node.node_id)
            .bind(&node.label)
            .bind(&attrs_json)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_edges(&self, edges: Vec<Edge>) -> Result<(), GraphError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for edge in edges {
            let (src, dst, edge_type, weight, attrs) = edge.decompose();
            let attrs_json = serde_json::to_string(&attrs)?;
            sqlx::query(
                "INSERT INTO edges (src, dst, edge_type, weight, attrs_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(src, dst, edge_type) DO UPDATE SET weight = excluded.weight, attrs_json = excluded.attrs_json",
            )
            .bind(&src)
            .bind(&dst)
            .bind(edge_type)
            .bind(weight)
            .bind(&attrs_json)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Breadth-first traversal over the edge table, visiting each node at
    /// most once, stopping at `max_depth` hops or `limit` results —
    /// whichever comes first. Ties within a layer keep discovery order.
    pub async fn neighbors(
        &self,
        node_id: &str,
        edge_types: Option<&[String]>,
        direction: Direction,
        max_depth: u32,
        limit: usize,
    ) -> Result<Vec<NeighborEdge>, GraphError> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(node_id.to_string());
        let mut frontier = VecDeque::new();
        frontier.push_back((node_id.to_string(), 0u32));
        let mut results = Vec::new();

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth || results.len() >= limit {
                continue;
            }
            let rows = self.fetch_adjacent(&current, edge_types, direction).await?;
            for (neighbor, edge_type, weight) in rows {
                if visited.contains(&neighbor) {
                    continue;
                }
                visited.insert(neighbor.clone());
                results.push(NeighborEdge {
                    node_id: neighbor.clone(),
                    edge_type,
                    weight,
                    depth: depth + 1,
                });
                if results.len() >= limit {
                    break;
                }
                frontier.push_back((neighbor, depth + 1));
            }
        }

        results.truncate(limit);
        Ok(results)
    }

    async fn fetch_adjacent(
        &self,
        node_id: &str,
        edge_types: Option<&[String]>,
        direction: Direction,
    ) -> Result<Vec<(String, String, f64)>, GraphError> {
        let mut out = Vec::new();
        let type_filter = edge_types.map(|types| {
            let quoted: Vec<String> = types.iter().map(|t| format!("'{}'", t.replace('\'', "''"))).collect();
            format!(" AND edge_type IN ({})", quoted.join(","))
        });

        if matches!(direction, Direction::Outgoing | Direction::Both) {
            let sql = format!(
                "SELECT dst, edge_type, weight FROM edges WHERE src = ?1{}",
                type_filter.clone().unwrap_or_default()
            );
            let rows = sqlx::query(&sql).bind(node_id).fetch_all(&self.pool).await?;
            for row in rows {
                out.push((row.get::<String, _>("dst"), row.get::<String, _>("edge_type"), row.get::<f64, _>("weight")));
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            let sql = format!(
                "SELECT src, edge_type, weight FROM edges WHERE dst = ?1{}",
                type_filter.unwrap_or_default()
            );
            let rows = sqlx::query(&sql).bind(node_id).fetch_all(&self.pool).await?;
            for row in rows {
                out.push((row.get::<String, _>("src"), row.get::<String, _>("edge_type"), row.get::<f64, _>("weight")));
            }
        }
        Ok(out)
    }

    /// BFS-based shortest path (unweighted hop count), reconstructed via a
    /// predecessor map. Returns `None` if unreachable within `max_depth`.
    pub async fn shortest_path(
        &self,
        from: &str,
        to: &str,
        edge_types: Option<&[String]>,
        max_depth: u32,
    ) -> Result<Option<Vec<String>>, GraphError> {
        if from == to {
            return Ok(Some(vec![from.to_string()]));
        }
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from.to_string());
        let mut predecessor: BTreeMap<String, String> = BTreeMap::new();
        let mut frontier = VecDeque::new();
        frontier.push_back((from.to_string(), 0u32));

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let adjacent = self.fetch_adjacent(&current, edge_types, Direction::Outgoing).await?;
            for (neighbor, _, _) in adjacent {
                if visited.contains(&neighbor) {
                    continue;
                }
                visited.insert(neighbor.clone());
                predecessor.insert(neighbor.clone(), current.clone());
                if neighbor == to {
                    let mut path = vec![to.to_string()];
                    let mut cursor = current.clone();
                    path.push(cursor.clone());
                    while let Some(prev) = predecessor.get(&cursor) {
                        if prev == from {
                            break;
                        }
                        path.push(prev.clone());
                        cursor = prev.clone();
                    }
                    path.push(from.to_string());
                    path.reverse();
                    path.dedup();
                    return Ok(Some(path));
                }
                frontier.push_back((neighbor, depth + 1));
            }
        }
        Ok(None)
    }

    pub async fn query_by_label(&self, label: &str, limit: usize) -> Result<Vec<GraphNode>, GraphError> {
        let rows = sqlx::query("SELECT node_id, label, attrs_json FROM nodes WHERE label = ?1 AND active = 1 LIMIT ?2")
            .bind(label)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let attrs_json: String = row.get("attrs_json");
                let attrs = serde_json::from_str(&attrs_json)?;
                Ok(GraphNode {
                    node_id: row.get("node_id"),
                    label: row.get("label"),
                    attrs,
                })
            })
            .collect()
    }

    /// Tombstones a document node and every chunk node it has, so a
    /// re-crawl's old generation never leaves a chunk node with no matching
    /// vector-store row (invariant 1). Cascades through `has_chunk` edges
    /// rather than assuming a naming convention for chunk ids.
    pub async fn tombstone_by_document(&self, document_id: &str) -> Result<(), GraphError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let chunk_ids: Vec<String> =
            sqlx::query_scalar("SELECT dst FROM edges WHERE src = ?1 AND edge_type = 'has_chunk'")
                .bind(document_id)
                .fetch_all(&mut *tx)
                .await?;

        for chunk_id in &chunk_ids {
            sqlx::query("UPDATE nodes SET active = 0, tombstoned_at = ?2 WHERE node_id = ?1")
                .bind(chunk_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM edges WHERE src = ?1 OR dst = ?1")
                .bind(chunk_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE nodes SET active = 0, tombstoned_at = ?2 WHERE node_id = ?1")
            .bind(document_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM edges WHERE src = ?1 OR dst = ?1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Hard-deletes nodes tombstoned before `retention` elapsed, mirroring
    /// the vector store's `tombstoned_at` gc so the two stores' retention
    /// windows can be driven by the same operator command.
    pub async fn gc(&self, retention: chrono::Duration) -> Result<usize, GraphError> {
        let cutoff = (Utc::now() - retention).to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let node_ids: Vec<String> = sqlx::query_scalar("SELECT node_id FROM nodes WHERE active = 0 AND tombstoned_at < ?1")
            .bind(&cutoff)
            .fetch_all(&mut *tx)
            .await?;

        for node_id in &node_ids {
            sqlx::query("DELETE FROM edges WHERE src = ?1 OR dst = ?1")
                .bind(node_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM nodes WHERE node_id = ?1")
                .bind(node_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(node_ids.len())
    }

    pub async fn stats(&self) -> Result<Stats, GraphError> {
        let n_nodes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes WHERE active = 1")
            .fetch_one(&self.pool)
            .await?;
        let n_edges: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM edges").fetch_one(&self.pool).await?;

        let label_rows = sqlx::query("SELECT label, COUNT(*) as c FROM nodes WHERE active = 1 GROUP BY label")
            .fetch_all(&self.pool)
            .await?;
        let per_label = label_rows
            .into_iter()
            .map(|row| (row.get::<String, _>("label"), row.get::<i64, _>("c") as usize))
            .collect();

        let type_rows = sqlx::query("SELECT edge_type, COUNT(*) as c FROM edges GROUP BY edge_type")
            .fetch_all(&self.pool)
            .await?;
        let per_type = type_rows
            .into_iter()
            .map(|row| (row.get::<String, _>("edge_type"), row.get::<i64, _>("c") as usize))
            .collect();

        Ok(Stats {
            n_nodes: n_nodes as usize,
            n_edges: n_edges as usize,
            per_label,
            per_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptolemies_core::ids::{ChunkId, DocumentId};
    use std::collections::BTreeMap;

    async fn open_store() -> GraphStore {
        GraphStore::connect("sqlite::memory:").await.unwrap()
    }

    fn node(id: &str, label: &str) -> GraphNode {
        GraphNode {
            node_id: id.to_string(),
            label: label.to_string(),
            attrs: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_and_query_by_label() {
        let store = open_store().await;
        store.upsert_nodes(vec![node("doc1", "document"), node("doc2", "document")]).await.unwrap();
        let docs = store.query_by_label("document", 10).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn neighbors_respects_max_depth() {
        let store = open_store().await;
        store
            .upsert_nodes(vec![node("doc1", "document"), node("chunk1", "chunk"), node("chunk2", "chunk")])
            .await
            .unwrap();
        store
            .upsert_edges(vec![
                Edge::HasChunk {
                    document_id: DocumentId::from("doc1"),
                    chunk_id: ChunkId::from("chunk1"),
                },
                Edge::HasChunk {
                    document_id: DocumentId::from("doc1"),
                    chunk_id: ChunkId::from("chunk2"),
                },
            ])
            .await
            .unwrap();

        let result = store.neighbors("doc1", None, Direction::Outgoing, 1, 10).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn tombstone_removes_edges() {
        let store = open_store().await;
        store.upsert_nodes(vec![node("doc1", "document"), node("chunk1", "chunk")]).await.unwrap();
        store
            .upsert_edges(vec![Edge::HasChunk {
                document_id: DocumentId::from("doc1"),
                chunk_id: ChunkId::from("chunk1"),
            }])
            .await
            .unwrap();
        store.tombstone_by_document("doc1").await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.n_edges, 0);
        assert_eq!(stats.n_nodes, 0);
    }
}
