//! Fixtures shared by the unit tests of the reconciliation pipeline
mod fixtures;

pub(crate) use fixtures::*;
