//! Codec for the `ot` entry of the W3C tracestate.
//!
//! The entry is a `;`-separated list of `key:value` pairs. The sampler
//! owns the `p` (per-span log-adjusted count) and `r` (trace randomness)
//! keys; every other syntactically valid pair is preserved verbatim for
//! forward compatibility.

use std::fmt::Write;

use thiserror::Error;

use crate::split::{MAX_P_VALUE, MAX_R_VALUE};

/// The tracestate key under which the sampler's state travels.
pub(crate) const TRACE_STATE_KEY: &str = "ot";

/// Hard cap on the serialized form of the entry.
const TRACE_STATE_SIZE_LIMIT: usize = 256;

/// Errors raised while decoding an `ot` tracestate entry.
///
/// Decoding never fails outright; each error kind describes the repair
/// that was applied so the caller can report it and continue.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub(crate) enum OtTraceStateError {
    /// The entry list did not match the `key:value` grammar (all fields
    /// were discarded), or a recognized field was not numeric (that
    /// field was discarded).
    #[error("ot tracestate: invalid syntax")]
    Syntax,

    /// A recognized field held a number outside its valid range; that
    /// field was discarded.
    #[error("ot tracestate: {0} value out of range")]
    Range(&'static str),

    /// The p and r fields cannot both be true of a single span; p was
    /// discarded.
    #[error("ot tracestate: inconsistent p and r values")]
    Inconsistent,
}

/// The decoded sampler state carried in the `ot` tracestate entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct OtTraceState {
    /// Log-adjusted count this span was sampled at; present iff sampled.
    pub(crate) pvalue: Option<u8>,
    /// Trace-wide randomness value, fixed at the root.
    pub(crate) rvalue: Option<u8>,
    /// Unrecognized `key:value` entries, preserved in order.
    pub(crate) unknown: Vec<String>,
}

impl OtTraceState {
    /// Decodes an `ot` tracestate value.
    ///
    /// Always yields a usable state alongside at most one error
    /// describing the repair that was applied:
    ///
    /// * an entry list that does not match the grammar discards
    ///   everything,
    /// * a recognized field that is non-numeric or out of range
    ///   discards only that field,
    /// * p-values that contradict the sampled flag or exceed r are
    ///   discarded.
    ///
    /// Fields are resolved in the order r, then p, then the p/r
    /// invariant, so a bad p never erases a good r.
    pub(crate) fn parse(value: &str, is_sampled: bool) -> (Self, Option<OtTraceStateError>) {
        if value.is_empty() {
            return (Self::default(), None);
        }
        if value.len() > TRACE_STATE_SIZE_LIMIT {
            return (Self::default(), Some(OtTraceStateError::Syntax));
        }

        let mut p_text = None;
        let mut r_text = None;
        let mut unknown = Vec::new();
        for entry in value.split(';') {
            let Some((key, entry_value)) = entry.split_once(':') else {
                return (Self::default(), Some(OtTraceStateError::Syntax));
            };
            if !valid_key(key) || !valid_value(entry_value) {
                return (Self::default(), Some(OtTraceStateError::Syntax));
            }
            match key {
                "p" => p_text = Some(entry_value),
                "r" => r_text = Some(entry_value),
                _ => unknown.push(entry.to_string()),
            }
        }

        let mut state = OtTraceState {
            pvalue: None,
            rvalue: None,
            unknown,
        };
        let mut error = None;

        if let Some(text) = r_text {
            match parse_number(text) {
                Some(r) if r <= MAX_R_VALUE as u64 => state.rvalue = Some(r as u8),
                Some(_) => error = Some(OtTraceStateError::Range("r")),
                None => error = Some(OtTraceStateError::Syntax),
            }
        }
        if let Some(text) = p_text {
            match parse_number(text) {
                Some(p) if p <= MAX_P_VALUE as u64 => state.pvalue = Some(p as u8),
                Some(_) => error = error.or(Some(OtTraceStateError::Range("p"))),
                None => error = error.or(Some(OtTraceStateError::Syntax)),
            }
        }

        // p is attributable only on a sampled trace, and only when it
        // does not exceed r (p = 63 encodes the zero-probability case
        // and is exempt).
        if let Some(p) = state.pvalue {
            let consistent = is_sampled
                && (p == MAX_P_VALUE || state.rvalue.map_or(true, |r| p <= r));
            if !consistent {
                state.pvalue = None;
                error = error.or(Some(OtTraceStateError::Inconsistent));
            }
        }

        (state, error)
    }

    /// Encodes the state as `p:N;r:N;<unknown entries>`.
    ///
    /// If the result would exceed the size cap, unknown entries are
    /// dropped from the tail until it fits; p and r are never dropped.
    pub(crate) fn serialize(&self) -> String {
        let mut out = String::new();
        if let Some(p) = self.pvalue {
            let _ = write!(out, "p:{p}");
        }
        if let Some(r) = self.rvalue {
            if !out.is_empty() {
                out.push(';');
            }
            let _ = write!(out, "r:{r}");
        }
        for entry in &self.unknown {
            if out.len() + entry.len() + usize::from(!out.is_empty()) > TRACE_STATE_SIZE_LIMIT {
                break;
            }
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(entry);
        }
        out
    }
}

fn valid_key(key: &str) -> bool {
    let mut bytes = key.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_lowercase() => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

fn valid_value(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

/// Parses a base-10 non-negative number, or `None` if the text is not
/// numeric. Overflow saturates: the digits are already validated, so a
/// failed conversion can only mean a value far beyond any field's range.
fn parse_number(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(text.parse::<u64>().unwrap_or(u64::MAX))
}
