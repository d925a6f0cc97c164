//! WebAssembly bindings for browsing machine files.
//!
//! Threads are unavailable on `wasm32-unknown-unknown`, so these bindings do
//! not drive a [`Machine`](crate::Machine). They replay a machine file's text
//! into a history tree that a web front end can inspect and compact.

#[cfg(feature = "wasm")]
pub mod api;

#[cfg(feature = "wasm")]
pub use api::{EventInfo, TimelineViewer};
