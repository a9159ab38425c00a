//! File watcher for continuous rebuilds
//!
//! Implements the `watch` command with:
//! - Debouncing (100ms by default, configurable)
//! - Glob filtering of filesystem events
//! - Serial rebuilds (a build runs to completion before the next batch)
//! - Graceful Ctrl+C shutdown
//! - NDJSON output for CI

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glob::{MatchOptions, Pattern};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::compiler::compile_mapping;
use crate::config::Config;
use crate::error::{LesswatchError, LesswatchResult};

/// Event channel poll interval in milliseconds
const POLL_MS: u64 = 50;

/// Watch options
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Resolved configuration (build table, globs, flags)
    pub config: Config,
    /// Output as NDJSON; also forwarded to spawned builds
    pub json: bool,
}

/// Watch event types for NDJSON output
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Started { roots: Vec<String> },
    FileChanged { path: String },
    BuildStarted,
    BuildComplete {
        compiled: usize,
        errors: usize,
        elapsed_ms: u128,
    },
    Error { message: String },
    Shutdown,
}

impl WatchEvent {
    pub fn to_json(&self) -> String {
        match self {
            WatchEvent::Started { roots } => {
                let roots: Vec<String> = roots
                    .iter()
                    .map(|r| format!("\"{}\"", json_escape(r)))
                    .collect();
                format!(r#"{{"event":"watch_started","roots":[{}]}}"#, roots.join(","))
            }
            WatchEvent::FileChanged { path } => {
                format!(r#"{{"event":"file_changed","path":"{}"}}"#, json_escape(path))
            }
            WatchEvent::BuildStarted => r#"{"event":"build_started"}"#.to_string(),
            WatchEvent::BuildComplete {
                compiled,
                errors,
                elapsed_ms,
            } => {
                format!(
                    r#"{{"event":"build_complete","compiled":{},"errors":{},"elapsed_ms":{}}}"#,
                    compiled, errors, elapsed_ms
                )
            }
            WatchEvent::Error { message } => {
                format!(r#"{{"event":"error","message":"{}"}}"#, json_escape(message))
            }
            WatchEvent::Shutdown => r#"{"event":"shutdown"}"#.to_string(),
        }
    }
}

/// Escape for embedding in a single-line NDJSON string: quotes,
/// backslashes and control characters (multi-line compile errors must
/// not break the one-object-per-line contract)
fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Watcher state for debouncing
struct WatcherState {
    pending_changes: HashSet<PathBuf>,
    last_change: Option<Instant>,
    debounce: Duration,
}

impl WatcherState {
    fn new(debounce: Duration) -> Self {
        Self {
            pending_changes: HashSet::new(),
            last_change: None,
            debounce,
        }
    }

    fn add_change(&mut self, path: PathBuf) {
        self.pending_changes.insert(path);
        self.last_change = Some(Instant::now());
    }

    fn should_build(&self) -> bool {
        match self.last_change {
            Some(last) => !self.pending_changes.is_empty() && last.elapsed() >= self.debounce,
            None => false,
        }
    }

    fn take_changes(&mut self) -> Vec<PathBuf> {
        let changes: Vec<_> = self.pending_changes.drain().collect();
        self.last_change = None;
        changes
    }
}

/// Matches filesystem event paths against the configured globs
struct GlobFilter {
    root: PathBuf,
    canonical_root: PathBuf,
    patterns: Vec<Pattern>,
}

impl GlobFilter {
    fn new(root: &Path, globs: &[String]) -> LesswatchResult<Self> {
        let mut patterns = Vec::with_capacity(globs.len());
        for g in globs {
            let pattern = Pattern::new(g).map_err(|e| LesswatchError::InvalidConfig {
                path: root.to_path_buf(),
                message: format!("invalid glob '{g}': {e}"),
            })?;
            patterns.push(pattern);
        }
        Ok(Self {
            root: root.to_path_buf(),
            canonical_root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            patterns,
        })
    }

    fn matches(&self, path: &Path) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::default()
        };

        // Globs are written relative to the config root; notify reports
        // absolute (sometimes canonicalized) paths.
        let relative = path
            .strip_prefix(&self.canonical_root)
            .or_else(|_| path.strip_prefix(&self.root))
            .ok();

        self.patterns.iter().any(|pattern| {
            relative.is_some_and(|rel| pattern.matches_path_with(rel, options))
                || pattern.matches_path_with(path, options)
        })
    }
}

/// Only content mutations re-arm the debounce. Access events in
/// particular must be dropped: the rebuild's own reads of watched
/// sources report as `Access(Open)` and would retrigger it forever.
fn is_mutation(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Longest literal prefix of a glob pattern - the directory to subscribe to
fn glob_root(pattern: &str) -> PathBuf {
    let mut root = PathBuf::new();
    for component in Path::new(pattern).components() {
        if component
            .as_os_str()
            .to_string_lossy()
            .contains(['*', '?', '['])
        {
            break;
        }
        root.push(component);
    }
    root
}

/// Directories to register with notify, deduplicated by containment
fn watch_roots(config: &Config) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = config
        .watch
        .globs
        .iter()
        .map(|g| {
            let prefix = glob_root(g);
            if prefix.as_os_str().is_empty() {
                config.root.clone()
            } else {
                config.root.join(prefix)
            }
        })
        .collect();

    roots.sort();
    roots.dedup();

    let mut deduped: Vec<PathBuf> = Vec::new();
    for root in roots {
        if !deduped.iter().any(|kept| root.starts_with(kept)) {
            deduped.push(root);
        }
    }
    deduped
}

/// Start watching for file changes. Returns only on shutdown or on a
/// fatal setup error; compile failures are reported through the callback
/// and do not stop the loop.
pub fn watch(
    options: &WatchOptions,
    running: Arc<AtomicBool>,
    event_callback: impl Fn(WatchEvent),
) -> LesswatchResult<()> {
    let config = &options.config;
    let filter = GlobFilter::new(&config.root, &config.watch.globs)?;

    let roots = watch_roots(config);
    for root in &roots {
        if !root.exists() {
            return Err(LesswatchError::WatchSetup {
                path: root.clone(),
                message: "watched path does not exist".to_string(),
            });
        }
    }

    let (tx, rx) = channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if !is_mutation(&event.kind) {
                    return;
                }
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|e| LesswatchError::WatchSetup {
        path: config.root.clone(),
        message: e.to_string(),
    })?;

    for root in &roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| LesswatchError::WatchSetup {
                path: root.clone(),
                message: e.to_string(),
            })?;
    }

    event_callback(WatchEvent::Started {
        roots: roots.iter().map(|r| r.display().to_string()).collect(),
    });

    if config.watch.build_at_start {
        run_build(options, &event_callback);
    }

    // Watch loop with debouncing; builds run serially, so an in-flight
    // build is never cancelled by a later event.
    let mut state = WatcherState::new(Duration::from_millis(config.watch.debounce_ms));

    while running.load(Ordering::SeqCst) {
        if let Ok(path) = rx.recv_timeout(Duration::from_millis(POLL_MS)) {
            if filter.matches(&path) {
                event_callback(WatchEvent::FileChanged {
                    path: path.display().to_string(),
                });
                state.add_change(path);
            }
        }

        if state.should_build() {
            let _changes = state.take_changes();
            run_build(options, &event_callback);
        }
    }

    event_callback(WatchEvent::Shutdown);
    Ok(())
}

fn run_build(options: &WatchOptions, callback: &impl Fn(WatchEvent)) {
    callback(WatchEvent::BuildStarted);
    let start = Instant::now();

    let (compiled, errors) = if options.config.watch.spawn {
        spawned_build(options, callback)
    } else {
        in_process_build(&options.config, callback)
    };

    callback(WatchEvent::BuildComplete {
        compiled,
        errors,
        elapsed_ms: start.elapsed().as_millis(),
    });
}

fn in_process_build(config: &Config, callback: &impl Fn(WatchEvent)) -> (usize, usize) {
    let mut compiled = 0;
    let mut errors = 0;

    for mapping in &config.mappings {
        match compile_mapping(mapping) {
            Ok(()) => compiled += 1,
            Err(e) => {
                errors += 1;
                callback(WatchEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    (compiled, errors)
}

/// Run `lesswatch build` as a fresh child process. Output semantics match
/// the in-process path; only per-invocation startup latency differs.
fn spawned_build(options: &WatchOptions, callback: &impl Fn(WatchEvent)) -> (usize, usize) {
    let Some(config_path) = &options.config.path else {
        callback(WatchEvent::Error {
            message: "spawn mode requires a config file".to_string(),
        });
        return (0, 1);
    };

    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            callback(WatchEvent::Error {
                message: format!("cannot locate own executable: {e}"),
            });
            return (0, 1);
        }
    };

    let mut command = Command::new(exe);
    if options.json {
        command.arg("--json");
    }
    command.arg("build").arg("--config").arg(config_path);

    match command.status() {
        Ok(status) if status.success() => (options.config.mappings.len(), 0),
        Ok(_) => (0, 1),
        Err(e) => {
            callback(WatchEvent::Error {
                message: format!("failed to spawn build: {e}"),
            });
            (0, 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildMapping, WatchConfig};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

    #[test]
    fn test_watch_event_to_json_started() {
        let event = WatchEvent::Started {
            roots: vec!["css/source".to_string()],
        };
        let json = event.to_json();
        assert!(json.contains("\"event\":\"watch_started\""));
        assert!(json.contains("\"roots\":[\"css/source\"]"));
    }

    #[test]
    fn test_watch_event_to_json_file_changed() {
        let event = WatchEvent::FileChanged {
            path: "css/source/_extend.less".to_string(),
        };
        let json = event.to_json();
        assert!(json.contains("\"event\":\"file_changed\""));
        assert!(json.contains("\"path\":\"css/source/_extend.less\""));
    }

    #[test]
    fn test_watch_event_to_json_build_complete() {
        let event = WatchEvent::BuildComplete {
            compiled: 1,
            errors: 0,
            elapsed_ms: 12,
        };
        let json = event.to_json();
        assert!(json.contains("\"event\":\"build_complete\""));
        assert!(json.contains("\"compiled\":1"));
        assert!(json.contains("\"errors\":0"));
        assert!(json.contains("\"elapsed_ms\":12"));
    }

    #[test]
    fn test_watch_event_to_json_error_escaped() {
        let event = WatchEvent::Error {
            message: "something \"failed\"".to_string(),
        };
        let json = event.to_json();
        assert!(json.contains("\\\"failed\\\""));
    }

    #[test]
    fn test_watch_event_to_json_error_stays_on_one_line() {
        let event = WatchEvent::Error {
            message: "line one\nline two\twith\rcontrols".to_string(),
        };
        let json = event.to_json();
        assert!(!json.contains('\n'));
        assert!(json.contains("line one\\nline two\\twith\\rcontrols"));
    }

    #[test]
    fn test_event_kind_filter_drops_reads() {
        use notify::event::{
            AccessKind, AccessMode, CreateKind, DataChange, ModifyKind, RemoveKind,
        };

        assert!(!is_mutation(&EventKind::Access(AccessKind::Open(
            AccessMode::Any
        ))));
        assert!(!is_mutation(&EventKind::Access(AccessKind::Read)));
        assert!(is_mutation(&EventKind::Create(CreateKind::File)));
        assert!(is_mutation(&EventKind::Modify(ModifyKind::Data(
            DataChange::Any
        ))));
        assert!(is_mutation(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn test_watcher_state_debouncing() {
        let mut state = WatcherState::new(TEST_DEBOUNCE);

        assert!(!state.should_build());

        state.add_change(PathBuf::from("a.less"));
        assert!(!state.should_build());

        std::thread::sleep(TEST_DEBOUNCE + Duration::from_millis(10));
        assert!(state.should_build());

        let changes = state.take_changes();
        assert_eq!(changes.len(), 1);
        assert!(!state.should_build());
    }

    #[test]
    fn test_watcher_state_coalesces_burst() {
        let mut state = WatcherState::new(TEST_DEBOUNCE);

        state.add_change(PathBuf::from("a.less"));
        state.add_change(PathBuf::from("a.less"));
        state.add_change(PathBuf::from("a.less"));

        std::thread::sleep(TEST_DEBOUNCE + Duration::from_millis(10));

        let changes = state.take_changes();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_glob_root_literal_prefix() {
        assert_eq!(
            glob_root("web/css/source/**/*.less"),
            PathBuf::from("web/css/source")
        );
        assert_eq!(glob_root("**/*.less"), PathBuf::new());
        assert_eq!(glob_root("css/main.less"), PathBuf::from("css/main.less"));
    }

    #[test]
    fn test_glob_filter_matches_by_extension() {
        let dir = tempdir().unwrap();
        let filter =
            GlobFilter::new(dir.path(), &["**/*.less".to_string()]).unwrap();

        assert!(filter.matches(&dir.path().join("a.less")));
        assert!(filter.matches(&dir.path().join("sub/deep/b.less")));
        assert!(!filter.matches(&dir.path().join("notes.txt")));
        assert!(!filter.matches(&dir.path().join("style.css")));
    }

    #[test]
    fn test_glob_filter_respects_literal_prefix() {
        let dir = tempdir().unwrap();
        let filter =
            GlobFilter::new(dir.path(), &["css/source/**/*.less".to_string()]).unwrap();

        assert!(filter.matches(&dir.path().join("css/source/_extend.less")));
        assert!(!filter.matches(&dir.path().join("css/other/_extend.less")));
    }

    #[test]
    fn test_glob_filter_invalid_pattern() {
        let dir = tempdir().unwrap();
        let result = GlobFilter::new(dir.path(), &["[".to_string()]);
        assert!(matches!(result, Err(LesswatchError::InvalidConfig { .. })));
    }

    fn test_config(root: &Path) -> Config {
        Config {
            mappings: vec![BuildMapping {
                source: root.join("src/main.less"),
                dest: root.join("out/main.css"),
            }],
            watch: WatchConfig {
                globs: vec!["src/**/*.less".to_string()],
                spawn: false,
                build_at_start: true,
                debounce_ms: 50,
            },
            root: root.to_path_buf(),
            path: None,
        }
    }

    #[test]
    fn test_watch_roots_derived_from_globs() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        assert_eq!(watch_roots(&config), vec![dir.path().join("src")]);
    }

    #[test]
    fn test_watch_roots_deduped_by_containment() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.watch.globs = vec![
            "src/**/*.less".to_string(),
            "src/theme/**/*.less".to_string(),
        ];
        assert_eq!(watch_roots(&config), vec![dir.path().join("src")]);
    }

    #[test]
    fn test_watch_missing_root_is_setup_error() {
        let dir = tempdir().unwrap();
        let options = WatchOptions {
            config: test_config(dir.path()),
            json: false,
        };
        let running = Arc::new(AtomicBool::new(false));

        let result = watch(&options, running, |_| {});
        assert!(matches!(result, Err(LesswatchError::WatchSetup { .. })));
    }

    #[test]
    fn test_watch_initial_build_and_shutdown() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/main.less"),
            "@c: red;\n.a { color: @c; }\n",
        )
        .unwrap();

        let options = WatchOptions {
            config: test_config(dir.path()),
            json: false,
        };

        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let running = Arc::new(AtomicBool::new(false)); // stop after one pass

        watch(&options, running, |event| {
            events_clone.lock().unwrap().push(event.to_json());
        })
        .unwrap();

        let captured = events.lock().unwrap();
        assert!(captured[0].contains("watch_started"));
        assert!(captured.iter().any(|e| e.contains("build_complete")));
        assert!(captured.last().unwrap().contains("shutdown"));

        let css = fs::read_to_string(dir.path().join("out/main.css")).unwrap();
        assert!(css.contains("color: red;"));
    }

    #[test]
    fn test_watch_compile_failure_does_not_stop_loop() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.less"), ".a { color red;\n").unwrap();

        let options = WatchOptions {
            config: test_config(dir.path()),
            json: false,
        };

        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let running = Arc::new(AtomicBool::new(false));

        // The initial build fails, but watch must still return Ok.
        watch(&options, running, |event| {
            events_clone.lock().unwrap().push(event.to_json());
        })
        .unwrap();

        let captured = events.lock().unwrap();
        assert!(captured.iter().any(|e| e.contains("\"event\":\"error\"")));
        assert!(captured.iter().any(|e| e.contains("\"errors\":1")));
    }
}
