//! Cross-module test suites
//!
//! Unit tests live next to their code; these exercise several modules
//! together against the in-memory chain in [`crate::test_utils`].

mod dispatch_tests;
mod tx_builder_tests;
