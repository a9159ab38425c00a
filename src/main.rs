//! lesswatch CLI - LESS stylesheet compiler with a watch loop
//!
//! Usage: lesswatch <COMMAND>
//!
//! Commands:
//!   build   Compile every configured mapping once
//!   watch   Watch for changes and rebuild continuously

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lesswatch::config::DEFAULT_CONFIG_FILE;

/// lesswatch - LESS stylesheet compiler with a watch loop
#[derive(Parser, Debug)]
#[command(name = "lesswatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Output NDJSON events for CI
    #[arg(long, default_value = "false")]
    json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile every configured mapping once
    Build {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// One-shot source stylesheet (bypasses the config file)
        #[arg(long, requires = "out")]
        source: Option<PathBuf>,

        /// One-shot destination path (bypasses the config file)
        #[arg(long, requires = "source")]
        out: Option<PathBuf>,
    },

    /// Watch for changes and rebuild continuously
    Watch {
        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            config,
            source,
            out,
        } => cmd_build(&config, source, out, cli.json, cli.verbose),
        Commands::Watch { config } => cmd_watch(&config, cli.json),
    }
}

fn load_config(config_path: &Path, source: Option<PathBuf>, out: Option<PathBuf>) -> Result<lesswatch::Config> {
    match (source, out) {
        (Some(source), Some(out)) => Ok(lesswatch::Config::single(source, out)),
        _ => Ok(lesswatch::Config::load(config_path)?),
    }
}

fn cmd_build(
    config_path: &Path,
    source: Option<PathBuf>,
    out: Option<PathBuf>,
    json: bool,
    verbose: u8,
) -> Result<()> {
    use lesswatch::compiler::compile_mapping;

    let config = load_config(config_path, source, out)?;

    if !json {
        println!("🎨 lesswatch build");
        if verbose > 0 {
            for mapping in &config.mappings {
                println!(
                    "  {} -> {}",
                    mapping.source.display(),
                    mapping.dest.display()
                );
            }
        }
        println!();
    }

    let start = Instant::now();

    for mapping in &config.mappings {
        let target_start = Instant::now();
        compile_mapping(mapping)
            .with_context(|| format!("failed to build {}", mapping.dest.display()))?;

        if json {
            let event = serde_json::json!({
                "event": "target_built",
                "source": mapping.source.display().to_string(),
                "dest": mapping.dest.display().to_string(),
                "elapsed_ms": target_start.elapsed().as_millis() as u64,
            });
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!(
                "  ✓ {} ({}ms)",
                mapping.dest.display(),
                target_start.elapsed().as_millis()
            );
        }
    }

    if json {
        let event = serde_json::json!({
            "event": "build_complete",
            "compiled": config.mappings.len(),
            "elapsed_ms": start.elapsed().as_millis() as u64,
        });
        println!("{}", serde_json::to_string(&event)?);
    } else {
        println!(
            "\n✓ Built {} target(s) in {}ms",
            config.mappings.len(),
            start.elapsed().as_millis()
        );
    }

    Ok(())
}

fn cmd_watch(config_path: &Path, json: bool) -> Result<()> {
    use lesswatch::watcher::{watch, WatchEvent, WatchOptions};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let config = lesswatch::Config::load(config_path)?;
    let options = WatchOptions { config, json };

    // Ctrl+C flips the flag; the loop drains the current build and exits.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    if !json {
        println!("👀 lesswatch watch");
        println!("Config: {}", config_path.display());
        println!("Press Ctrl+C to stop\n");
    }

    watch(&options, running, |event| {
        if json {
            println!("{}", event.to_json());
        } else {
            match event {
                WatchEvent::Started { roots } => {
                    for root in roots {
                        println!("📂 Watching: {}", root);
                    }
                }
                WatchEvent::FileChanged { path } => {
                    println!("📝 Changed: {}", path);
                }
                WatchEvent::BuildStarted => {
                    println!("🔄 Building...");
                }
                WatchEvent::BuildComplete {
                    compiled,
                    errors,
                    elapsed_ms,
                } => {
                    if errors > 0 {
                        println!(
                            "⚠ Build: {} compiled, {} errors ({}ms)",
                            compiled, errors, elapsed_ms
                        );
                    } else {
                        println!("✓ Build: {} compiled ({}ms)", compiled, elapsed_ms);
                    }
                }
                WatchEvent::Error { message } => {
                    eprintln!("✗ Error: {}", message);
                }
                WatchEvent::Shutdown => {
                    println!("\n👋 Shutting down...");
                }
            }
        }
    })?;

    Ok(())
}
