//! End-to-end match scenarios driven through the mock provider.

mod harness;
mod log_invariant_tests;
mod scenario_tests;
