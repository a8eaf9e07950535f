use crate::context::EngineContext;
use crate::error::CliError;

/// Runs `stats`, printing `{vector: {...}, graph: {...}}` to stdout. Always
/// exits 0; a store error still surfaces as a normal `CliError`.
pub async fn run(ctx: &EngineContext) -> Result<i32, CliError> {
    let vector = ctx.vector.stats().await?;
    let graph = ctx.graph.stats().await?;
    let combined = serde_json::json!({
        "vector": vector,
        "graph": graph,
    });
    println!("{}", serde_json::to_string_pretty(&combined).expect("Stats serialization never fails"));
    Ok(0)
}
