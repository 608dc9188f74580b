//! Consistent probability sampling for OpenTelemetry.
//!
//! The [`ProbabilityBased`] sampler records a configurable fraction of
//! spans while keeping decisions *consistent* across every process that
//! participates in a trace: when a span is sampled with adjusted
//! probability `q`, all of its ancestors and descendants sampled with
//! probability greater than or equal to `q` are sampled as well. Trace
//! consumers can therefore multiply each sampled span by its adjusted
//! count to produce unbiased estimates of the full span population.
//!
//! Consistency is achieved by encoding two small integers in the `ot`
//! entry of the W3C tracestate:
//!
//! * the trace-wide `r` value, drawn once at the root from a geometric
//!   distribution and propagated unchanged, and
//! * the per-span `p` value, the base-2 logarithm of the adjusted count
//!   the span was sampled at, present only on sampled spans.
//!
//! A span is sampled exactly when `p <= r`. Sampling probabilities that
//! are not exact powers of two are realized by randomly choosing between
//! the two neighboring powers of two so that the expected sampling rate
//! matches the configured fraction.
//!
//! [`ParentProbabilityBased`] wraps any root sampler with the standard
//! parent-based composition and additionally repairs malformed inherited
//! `ot` tracestate before any delegate can observe it.
//!
//! # Getting started
//!
//! ```no_run
//! use opentelemetry_probability_sampler::{ParentProbabilityBased, ProbabilityBased};
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//!
//! // Sample roughly 1 in 100 traces, honoring the parent decision for
//! // non-root spans.
//! let provider = SdkTracerProvider::builder()
//!     .with_sampler(ParentProbabilityBased::new(ProbabilityBased::new(0.01)))
//!     .build();
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

use opentelemetry_sdk::trace::{Sampler, ShouldSample};

mod parent;
mod random;
mod sampler;
mod split;
mod tracestate;

pub use parent::ParentProbabilityBased;
pub use random::RandomSource;
pub use sampler::ProbabilityBased;

/// A sampler that can also report a human-readable description of its
/// configuration.
///
/// The OpenTelemetry sampling specification expects every sampler to
/// expose a description string alongside its decision function. The SDK's
/// [`ShouldSample`] trait covers the decision half; this trait adds the
/// description so samplers remain composable as trait objects, e.g. as the
/// delegates of [`ParentProbabilityBased`].
pub trait DescribedSampler: ShouldSample + CloneDescribedSampler {
    /// Returns the sampler's description string.
    fn description(&self) -> String;
}

/// This trait should not be used directly; instead users should use
/// [`DescribedSampler`].
pub trait CloneDescribedSampler {
    /// Clones the sampler into a new trait object.
    fn box_clone(&self) -> Box<dyn DescribedSampler>;
}

impl<T> CloneDescribedSampler for T
where
    T: DescribedSampler + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn DescribedSampler> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn DescribedSampler> {
    fn clone(&self) -> Self {
        CloneDescribedSampler::box_clone(self.as_ref())
    }
}

impl DescribedSampler for Sampler {
    fn description(&self) -> String {
        match self {
            Sampler::AlwaysOn => "AlwaysOnSampler".to_string(),
            Sampler::AlwaysOff => "AlwaysOffSampler".to_string(),
            Sampler::TraceIdRatioBased(fraction) => {
                format!("TraceIdRatioBased{{{fraction}}}")
            }
            // The enum is non-exhaustive; remaining variants have no
            // specified description string.
            other => format!("{other:?}"),
        }
    }
}
