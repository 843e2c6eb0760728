/*! Integration tests for Racer.
 *
 * This suite is organized as a single integration test binary following
 * the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * Component-level behavior (path canonicalization, tree splicing, the
 * mutator pipeline, event dispatch, load refcounting, query hashing,
 * bundle round-trips) is covered by `#[cfg(test)]` modules inline in
 * each source file, the same split the teacher uses. This binary covers
 * what only shows up across module boundaries: the end-to-end scenarios
 * and testable properties from the spec this crate implements, and
 * multi-root convergence through a shared `DocStore`.
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("racer=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

mod helpers;
mod properties;
mod scenarios;
