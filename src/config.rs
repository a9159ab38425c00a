//! Configuration for lesswatch
//!
//! Loads a TOML file (`lesswatch.toml` by default) describing the build
//! table and the watch settings. The resulting [`Config`] is constructed
//! once at startup and passed explicitly into the `build` and `watch`
//! entry points; there is no ambient/global lookup.
//!
//! ```toml
//! [build]
//! "web/css/source/_extend.css" = "web/css/source/_extend.less"
//!
//! [watch]
//! globs = ["web/css/source/**/*.less"]
//! spawn = false
//! build_at_start = false
//! debounce_ms = 100
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{LesswatchError, LesswatchResult};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "lesswatch.toml";

fn default_globs() -> Vec<String> {
    vec!["**/*.less".to_string()]
}

fn default_debounce_ms() -> u64 {
    100
}

/// One compilation unit: a source stylesheet and its destination path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMapping {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Settings for the `watch` command
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Glob patterns selecting the files whose changes trigger a rebuild
    #[serde(default = "default_globs")]
    pub globs: Vec<String>,

    /// Run each rebuild as a freshly spawned `lesswatch build` process
    /// instead of calling the compiler in-process
    #[serde(default)]
    pub spawn: bool,

    /// Run one build immediately after the watch subscription is set up
    #[serde(default)]
    pub build_at_start: bool,

    /// Quiet window after the last matching event before a rebuild fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            globs: default_globs(),
            spawn: false,
            build_at_start: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Resolved configuration passed into the build and watch entry points
#[derive(Debug, Clone)]
pub struct Config {
    /// Build mappings in deterministic (destination path) order
    pub mappings: Vec<BuildMapping>,
    pub watch: WatchConfig,
    /// Directory relative paths (mappings and globs) resolve against
    pub root: PathBuf,
    /// The file this config was loaded from, if any
    pub path: Option<PathBuf>,
}

/// Raw on-disk shape of lesswatch.toml
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    /// Destination path -> source path
    #[serde(default)]
    build: BTreeMap<String, String>,

    #[serde(default)]
    watch: Option<WatchConfig>,
}

impl Config {
    /// Load a configuration file from disk
    pub fn load(path: &Path) -> LesswatchResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LesswatchError::InvalidConfig {
                    path: path.to_path_buf(),
                    message: "file not found (pass --config, or --source/--out for a one-shot build)"
                        .to_string(),
                }
            } else {
                LesswatchError::Io(e)
            }
        })?;

        let file: ConfigFile =
            toml::from_str(&content).map_err(|e| LesswatchError::InvalidConfig {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if file.build.is_empty() {
            return Err(LesswatchError::EmptyBuildTable {
                path: path.to_path_buf(),
            });
        }

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        // BTreeMap iteration keeps the mapping order deterministic.
        let mappings = file
            .build
            .into_iter()
            .map(|(dest, source)| BuildMapping {
                source: root.join(source),
                dest: root.join(dest),
            })
            .collect();

        Ok(Self {
            mappings,
            watch: file.watch.unwrap_or_default(),
            root,
            path: Some(path.to_path_buf()),
        })
    }

    /// Build a single-mapping configuration from CLI overrides
    pub fn single(source: PathBuf, dest: PathBuf) -> Self {
        let root = source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            mappings: vec![BuildMapping { source, dest }],
            watch: WatchConfig::default(),
            root,
            path: None,
        }
    }
}
