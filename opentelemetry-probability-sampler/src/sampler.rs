use std::sync::{Arc, Mutex, PoisonError};

use opentelemetry::{
    otel_warn,
    trace::{
        Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    },
    Context, KeyValue,
};
use opentelemetry_sdk::trace::ShouldSample;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::random::RandomSource;
use crate::split::{exp_to_float64, split_prob, MAX_P_VALUE, MAX_R_VALUE};
use crate::tracestate::{OtTraceState, TRACE_STATE_KEY};
use crate::DescribedSampler;

/// A consistent probability sampler.
///
/// Samples the configured fraction of spans, in expectation, while
/// propagating the `p` and `r` values through the `ot` tracestate entry
/// so that all participants in a trace decide consistently. Malformed
/// inherited entries are repaired in place; a span always receives a
/// decision.
///
/// Cloning is cheap and clones share one pseudo-random source behind a
/// lock, which is held only for the draws of a single decision.
#[derive(Clone, Debug)]
pub struct ProbabilityBased {
    /// Log-adjusted count of the smaller neighboring power of two.
    low: u8,
    /// Log-adjusted count of the larger one, `low - 1` except for the
    /// zero-probability sentinel.
    high: u8,
    /// Probability of selecting `low` over `high`.
    low_prob: f64,
    rng: Arc<Mutex<Box<dyn RandomSource>>>,
}

impl ProbabilityBased {
    /// Creates a sampler recording the given fraction of spans.
    ///
    /// The fraction is clamped into `[0.0, 1.0]`; fractions below 2^-62
    /// never sample. The random source is seeded from OS entropy.
    pub fn new(fraction: f64) -> Self {
        Self::with_random_source(fraction, SmallRng::from_os_rng())
    }

    /// Creates a sampler drawing from the provided random source.
    pub fn with_random_source<R>(fraction: f64, source: R) -> Self
    where
        R: RandomSource + 'static,
    {
        let (low, high, low_prob) = split_prob(fraction);
        ProbabilityBased {
            low,
            high,
            low_prob,
            rng: Arc::new(Mutex::new(Box::new(source))),
        }
    }

    fn low_choice(&self, rng: &mut dyn RandomSource) -> bool {
        self.low_prob == 1.0 || rng.float64() < self.low_prob
    }

    /// The effective sampling probability, recomputed from the split.
    fn probability(&self) -> f64 {
        if self.low == MAX_P_VALUE {
            return 0.0;
        }
        self.low_prob * exp_to_float64(-(self.low as i32))
            + (1.0 - self.low_prob) * exp_to_float64(-(self.high as i32))
    }
}

/// Draws a fresh r-value: the number of leading zeros of a uniform
/// 63-bit integer, clamped into the valid range. The count is at least 1
/// because the top bit of `int63` is always clear.
fn next_r(rng: &mut dyn RandomSource) -> u8 {
    MAX_R_VALUE.min(((rng.int63() as u64).leading_zeros() - 1) as u8)
}

impl ShouldSample for ProbabilityBased {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        _trace_id: TraceId,
        _name: &str,
        _span_kind: &SpanKind,
        _attributes: &[KeyValue],
        _links: &[Link],
    ) -> SamplingResult {
        let (trace_state, parent_sampled) = match parent_context
            .filter(|cx| cx.has_active_span())
        {
            Some(cx) => {
                let span = cx.span();
                let span_context = span.span_context();
                (
                    span_context.trace_state().clone(),
                    span_context.is_sampled(),
                )
            }
            None => (TraceState::default(), false),
        };

        let ot_value = trace_state.get(TRACE_STATE_KEY).unwrap_or("");
        let (mut state, error) = OtTraceState::parse(ot_value, parent_sampled);
        if let Some(error) = error {
            otel_warn!(
                name: "ProbabilityBased.InvalidTraceState",
                message = "malformed ot tracestate entry was repaired",
                reason = error.to_string(),
                tracestate = ot_value.to_string(),
            );
        }

        let (r, lac) = {
            let mut guard = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let source = guard.as_mut();
            let r = match state.rvalue {
                Some(r) => r,
                None => next_r(source),
            };
            let lac = if self.low_choice(source) {
                self.low
            } else {
                self.high
            };
            (r, lac)
        };
        state.rvalue = Some(r);

        let decision = if lac <= r {
            state.pvalue = Some(lac);
            SamplingDecision::RecordAndSample
        } else {
            state.pvalue = None;
            SamplingDecision::Drop
        };

        let trace_state = match trace_state.insert(TRACE_STATE_KEY, state.serialize()) {
            Ok(updated) => updated,
            Err(_) => {
                otel_warn!(
                    name: "ProbabilityBased.TraceStateUpdateFailed",
                    message = "emitting the parent tracestate unchanged"
                );
                trace_state
            }
        };

        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state,
        }
    }
}

impl DescribedSampler for ProbabilityBased {
    fn description(&self) -> String {
        format!("ProbabilityBased{{{}}}", self.probability())
    }
}
