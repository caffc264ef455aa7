//! End-to-end and cross-crate invariant tests for the shared heap: arena,
//! key domain, stores, caches, and layout lattice composed the way a real
//! worker process would use them, rather than unit-tested in isolation.

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod invariants;
