//! Library target for the `nicodl` package.
//!
//! The deliverable of this package is the `nicodl` CLI binary (`src/main.rs`). This library
//! only re-exports the engine so `cargo test -p nicodl --doc` has something to check.

#[doc(hidden)]
pub use nicodl_engine;
