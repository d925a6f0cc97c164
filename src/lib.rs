//! # Emulator Timeline
//!
//! A branching, persisted history of everything that happened to an emulated
//! machine, with a live engine bound to the cursor of that history.
//!
//! Every input (key edges, resets, disc and tape swaps) and every snapshot is
//! a node in a tree. Rewinding to an earlier node and acting again starts a
//! new branch instead of discarding the old one. The tree is persisted as an
//! append-only line log, the *machine file*, that can be replayed to rebuild
//! it exactly.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use emutimeline::{Machine, MemoryFileSystem, StopReason};
//!
//! let fs = MemoryFileSystem::new();
//! let mut machine = Machine::new("demo", "demo.cpvc", Arc::new(fs.clone())).unwrap();
//!
//! machine.key(58, true).unwrap();
//! machine.run_until(100_000, StopReason::NONE).unwrap();
//! let bookmark = machine.add_bookmark(false).unwrap();
//! assert!(bookmark.is_some());
//!
//! machine.close().unwrap();
//! assert_eq!(fs.lines("demo.cpvc")[0], "name:demo");
//! ```
//!
//! ## Architecture
//!
//! - `machine` - the [`Machine`] handle and its single-writer dispatcher thread
//! - `history` - the in-memory [`HistoryTree`] arena
//! - `codec` - machine file records, replay and compaction
//! - `engine` - the [`Engine`] contract and the deterministic [`ReferenceCore`]
//! - `fs` - the injected [`FileSystem`] capability
//! - `config` - [`TimelineConfig`], loadable from TOML
//!
//! The engine is a contract, not a particular emulator: hosts plug their own
//! in through [`MachineOptions::engine_factory`].

pub mod action;
pub mod bookmark;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod history;
pub mod machine;

// WASM bindings (only compiled when wasm feature is enabled)
#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export public API
pub use action::{Action, ActionType, CoreRequest, Media};
pub use bookmark::Bookmark;
pub use config::{ConfigError, TimelineConfig};
pub use engine::{
    reference_factory, Engine, EngineError, EngineFactory, ReferenceCore, StopReason,
};
pub use error::{Result, TimelineError};
pub use fs::{DiskFileSystem, FileSystem, LogFile, MemoryFileSystem, SharedFileSystem};
pub use history::{EventId, EventKind, EventType, HistoryEvent, HistoryTree};
pub use machine::{AutoPause, Machine, MachineOptions, MachineStatus};
