use crate::context::EngineContext;
use crate::error::CliError;
use tracing::info;

/// Runs `gc --retention <duration>`, hard-deleting tombstoned rows older
/// than `retention` from both stores. Always exit 0 on success; store
/// errors propagate and map to exit 4 in `main`.
pub async fn run(ctx: &EngineContext, retention: chrono::Duration) -> Result<i32, CliError> {
    let vector_deleted = ctx.vector.gc(retention).await?;
    let graph_deleted = ctx.graph.gc(retention).await?;
    info!(vector_deleted, graph_deleted, "gc complete");
    Ok(0)
}
