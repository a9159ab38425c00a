//! lesswatch - LESS stylesheet compiler with a watch loop
//!
//! lesswatch compiles LESS stylesheets (variables, nesting, imports) to
//! plain CSS from a declarative build table, and can watch a directory
//! tree for changes, rebuilding the configured targets on every
//! qualifying filesystem event.

pub mod compiler;
pub mod config;
pub mod error;
pub mod watcher;

// Re-exports for convenience
pub use compiler::{compile_file, compile_mapping};
pub use config::{BuildMapping, Config, WatchConfig, DEFAULT_CONFIG_FILE};
pub use error::{LesswatchError, LesswatchResult};
pub use watcher::{watch, WatchEvent, WatchOptions};
