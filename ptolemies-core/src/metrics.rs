//! The metric-emission contract. Observability plumbing beyond this is out
//! of scope; this trait is the seam an operator wires a real exporter into.

use std::sync::Arc;

pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &'static str, value: u64) {
        let _ = (name, value);
    }
    fn set_gauge(&self, name: &'static str, value: f64) {
        let _ = (name, value);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

pub fn noop() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetrics)
}
