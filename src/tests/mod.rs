//! tests/mod.rs
mod support;

mod models_tests;
mod rate_limiter_tests;
mod retry_policy_tests;
