//! Immutable per-tick view of every sample received since the previous flush.
//!
//! Builders are arena maps keyed by entity id and filled by the sources. A single
//! `build()` freezes them into [`ObservedCalls`] and [`ObservedSfus`], copying the
//! identifying fields of each parent into its children by value.
mod observed_calls;
mod observed_sfus;

pub use observed_calls::*;
pub use observed_sfus::*;

#[cfg(test)]
mod observed_sfus_test;

use std::sync::Arc;

use crate::time::Timestamp;

/// A sample fragment together with the timestamp of the sample it was cut from
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<S> {
    pub timestamp: Timestamp,
    pub sample: S,
}

/// Snapshot pair handed from the sources to the evaluator
#[derive(Debug, Clone, Default)]
pub struct ObservedSamples {
    pub observed_calls: Arc<ObservedCalls>,
    pub observed_sfus: Arc<ObservedSfus>,
    pub number_of_samples: usize,
}

impl ObservedSamples {
    pub fn new(
        observed_calls: ObservedCalls,
        observed_sfus: ObservedSfus,
        number_of_samples: usize,
    ) -> Self {
        Self {
            observed_calls: Arc::new(observed_calls),
            observed_sfus: Arc::new(observed_sfus),
            number_of_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimestampRange {
    pub(crate) min: Timestamp,
    pub(crate) max: Timestamp,
}

impl TimestampRange {
    pub(crate) fn extend(
        range: &mut Option<TimestampRange>,
        timestamp: Timestamp,
    ) {
        *range = Some(match range {
            Some(r) => TimestampRange {
                min: r.min.min(timestamp),
                max: r.max.max(timestamp),
            },
            None => TimestampRange {
                min: timestamp,
                max: timestamp,
            },
        });
    }
}
