use opentelemetry::{
    otel_warn,
    trace::{Link, SamplingResult, SpanContext, SpanKind, TraceContextExt, TraceId},
    Context, KeyValue,
};
use opentelemetry_sdk::trace::{Sampler, ShouldSample};

use crate::tracestate::{OtTraceState, TRACE_STATE_KEY};
use crate::DescribedSampler;

/// A parent-based sampler composition that repairs malformed `ot`
/// tracestate before delegating.
///
/// Root spans are routed to the configured root sampler; spans with a
/// parent are routed by the parent's remote/sampled flavour, defaulting
/// to propagating the parent's sampled flag. Before any delegate runs,
/// the parent's `ot` tracestate entry is validated, and if it fails to
/// parse the delegate receives a rewritten context carrying the repaired
/// entry, so no delegate ever observes malformed state.
#[derive(Clone, Debug)]
pub struct ParentProbabilityBased {
    root: Box<dyn DescribedSampler>,
    remote_parent_sampled: Box<dyn DescribedSampler>,
    remote_parent_not_sampled: Box<dyn DescribedSampler>,
    local_parent_sampled: Box<dyn DescribedSampler>,
    local_parent_not_sampled: Box<dyn DescribedSampler>,
}

impl ParentProbabilityBased {
    /// Creates the composition around a root sampler, typically a
    /// [`ProbabilityBased`](crate::ProbabilityBased).
    pub fn new<S>(root: S) -> Self
    where
        S: DescribedSampler + 'static,
    {
        ParentProbabilityBased {
            root: Box::new(root),
            remote_parent_sampled: Box::new(Sampler::AlwaysOn),
            remote_parent_not_sampled: Box::new(Sampler::AlwaysOff),
            local_parent_sampled: Box::new(Sampler::AlwaysOn),
            local_parent_not_sampled: Box::new(Sampler::AlwaysOff),
        }
    }

    /// Replaces the sampler used for spans with a sampled remote parent.
    pub fn with_remote_parent_sampled<S>(mut self, sampler: S) -> Self
    where
        S: DescribedSampler + 'static,
    {
        self.remote_parent_sampled = Box::new(sampler);
        self
    }

    /// Replaces the sampler used for spans with an unsampled remote
    /// parent.
    pub fn with_remote_parent_not_sampled<S>(mut self, sampler: S) -> Self
    where
        S: DescribedSampler + 'static,
    {
        self.remote_parent_not_sampled = Box::new(sampler);
        self
    }

    /// Replaces the sampler used for spans with a sampled local parent.
    pub fn with_local_parent_sampled<S>(mut self, sampler: S) -> Self
    where
        S: DescribedSampler + 'static,
    {
        self.local_parent_sampled = Box::new(sampler);
        self
    }

    /// Replaces the sampler used for spans with an unsampled local
    /// parent.
    pub fn with_local_parent_not_sampled<S>(mut self, sampler: S) -> Self
    where
        S: DescribedSampler + 'static,
    {
        self.local_parent_not_sampled = Box::new(sampler);
        self
    }
}

/// Returns a context with the parent's `ot` tracestate entry rewritten,
/// or `None` when the inherited entry needs no repair.
fn repair_parent(cx: &Context) -> Option<Context> {
    if !cx.has_active_span() {
        return None;
    }
    let span = cx.span();
    let span_context = span.span_context();
    let trace_state = span_context.trace_state();
    let ot_value = trace_state.get(TRACE_STATE_KEY).unwrap_or("");
    let (state, error) = OtTraceState::parse(ot_value, span_context.is_sampled());
    let error = error?;

    otel_warn!(
        name: "ParentProbabilityBased.InvalidTraceState",
        message = "malformed ot tracestate entry was repaired before delegation",
        reason = error.to_string(),
        tracestate = ot_value.to_string(),
    );

    let serialized = state.serialize();
    let repaired = if serialized.is_empty() {
        trace_state.delete(TRACE_STATE_KEY)
    } else {
        trace_state.insert(TRACE_STATE_KEY, serialized)
    };
    let repaired = match repaired {
        Ok(updated) => updated,
        Err(_) => return None,
    };

    // Span contexts are immutable; repairing means attaching a new one.
    Some(cx.with_remote_span_context(SpanContext::new(
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags(),
        span_context.is_remote(),
        repaired,
    )))
}

impl ShouldSample for ParentProbabilityBased {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let repaired = parent_context.and_then(repair_parent);
        let parent_context = repaired.as_ref().or(parent_context);

        let delegate = match parent_context.filter(|cx| cx.has_active_span()) {
            None => &self.root,
            Some(cx) => {
                let span = cx.span();
                let span_context = span.span_context();
                match (span_context.is_remote(), span_context.is_sampled()) {
                    (true, true) => &self.remote_parent_sampled,
                    (true, false) => &self.remote_parent_not_sampled,
                    (false, true) => &self.local_parent_sampled,
                    (false, false) => &self.local_parent_not_sampled,
                }
            }
        };

        delegate.should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }
}

impl DescribedSampler for ParentProbabilityBased {
    fn description(&self) -> String {
        format!(
            "ParentProbabilityBased{{root:{},remoteParentSampled:{},remoteParentNotSampled:{},localParentSampled:{},localParentNotSampled:{}}}",
            self.root.description(),
            self.remote_parent_sampled.description(),
            self.remote_parent_not_sampled.description(),
            self.local_parent_sampled.description(),
            self.local_parent_not_sampled.description(),
        )
    }
}
