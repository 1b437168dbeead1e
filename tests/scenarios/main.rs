//! Scenario tests: whole manifests run through the engine with a mock runner

#[path = "../helpers.rs"]
mod helpers;

mod allow_failures;
mod build_off;
mod directory_stack;
mod fast_finish;
mod fixture_deny;
mod hooks;
mod matrix_isolation;
mod variable_substitution;
