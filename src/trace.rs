// Trace context enrichment
//
// No process-wide mutable state: an explicit context on the record wins,
// otherwise the task-local scope set by `with_trace_context` applies. The
// scope dies with the task, so cancellation cleans it up for free.

use std::future::Future;

/// Tracing identifiers attached to events and propagated as HTTP headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }
}

tokio::task_local! {
    static CURRENT_TRACE: TraceContext;
}

/// Run `fut` with `ctx` as the ambient trace context for `log` calls made
/// inside it.
pub async fn with_trace_context<F>(ctx: TraceContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_TRACE.scope(ctx, fut).await
}

/// The ambient trace context of the current task, if any.
pub fn current_trace_context() -> Option<TraceContext> {
    CURRENT_TRACE.try_with(|ctx| ctx.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_sets_and_clears() {
        assert!(current_trace_context().is_none());

        let ctx = TraceContext::new("trace-1", "span-1").with_parent("span-0");
        let observed = with_trace_context(ctx.clone(), async { current_trace_context() }).await;
        assert_eq!(observed, Some(ctx));

        assert!(current_trace_context().is_none());
    }

    #[tokio::test]
    async fn test_nested_scopes_shadow() {
        let outer = TraceContext::new("t", "outer");
        let inner = TraceContext::new("t", "inner");
        with_trace_context(outer.clone(), async {
            assert_eq!(current_trace_context().unwrap().span_id, "outer");
            with_trace_context(inner, async {
                assert_eq!(current_trace_context().unwrap().span_id, "inner");
            })
            .await;
            assert_eq!(current_trace_context().unwrap().span_id, "outer");
        })
        .await;
    }
}
