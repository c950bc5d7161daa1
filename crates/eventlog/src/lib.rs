//! Persistent schedule log and change notification bridge.
//!
//! This crate provides:
//! - [`EventLog`] trait with JSON-file and in-memory implementations
//! - Atomic whole-file rewrites (temp file, then rename)
//! - [`LogWatcher`]: `notify`-based change detection with debounce and a polling fallback

mod error;
mod file;
mod log;
mod memory;
mod watcher;

pub use self::error::{EventLogError, Result};
pub use self::file::JsonFileLog;
pub use self::log::{parse_events, EventLog};
pub use self::memory::MemoryLog;
pub use self::watcher::{LogChange, LogWatcher, WatchConfig, WatchHandle};
