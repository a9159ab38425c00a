//! LESS-to-CSS compilation pipeline
//!
//! `compile_file` reads a source stylesheet, resolves its `@import`
//! statements (inline splice, relative to the importing file), evaluates
//! variables and nesting, and returns plain CSS. `compile_mapping` adds
//! the atomic destination write: on any failure the previous destination
//! content is left untouched.

mod eval;
mod parse;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::BuildMapping;
use crate::error::{LesswatchError, LesswatchResult};
use eval::SourceChunk;
use parse::Item;

/// Compile one LESS source file to CSS text
pub fn compile_file(path: &Path) -> LesswatchResult<String> {
    let mut visiting = Vec::new();
    let mut chunks = Vec::new();
    load_chunks(path, &mut visiting, &mut chunks)?;

    eval::evaluate(&chunks).map_err(|e| LesswatchError::Compile {
        file: e.file,
        line: e.pos.line,
        column: e.pos.column,
        message: e.message,
    })
}

/// Compile one build mapping, writing the destination atomically
pub fn compile_mapping(mapping: &BuildMapping) -> LesswatchResult<()> {
    let css = compile_file(&mapping.source)?;
    write_output(&mapping.dest, &css)
}

/// Read a file and append its top-level items as chunks, recursing into
/// imports. `visiting` is the canonicalized import stack for cycle checks.
fn load_chunks(
    path: &Path,
    visiting: &mut Vec<PathBuf>,
    chunks: &mut Vec<SourceChunk>,
) -> LesswatchResult<()> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LesswatchError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            LesswatchError::Io(e)
        }
    })?;

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    visiting.push(canonical);

    let items = parse::parse(&content).map_err(|e| LesswatchError::Compile {
        file: path.to_path_buf(),
        line: e.pos.line,
        column: e.pos.column,
        message: e.message,
    })?;

    let mut current = Vec::new();
    for item in items {
        match item {
            Item::Import { target, .. } => {
                flush_chunk(path, &mut current, chunks);

                let import_path = resolve_import(path, &target);
                if let Ok(canonical) = import_path.canonicalize() {
                    if visiting.contains(&canonical) {
                        return Err(LesswatchError::ImportCycle {
                            file: path.to_path_buf(),
                            import: import_path,
                        });
                    }
                }
                load_chunks(&import_path, visiting, chunks)?;
            }
            other => current.push(other),
        }
    }
    flush_chunk(path, &mut current, chunks);

    visiting.pop();
    Ok(())
}

fn flush_chunk(file: &Path, current: &mut Vec<Item>, chunks: &mut Vec<SourceChunk>) {
    if !current.is_empty() {
        chunks.push(SourceChunk {
            file: file.to_path_buf(),
            items: std::mem::take(current),
        });
    }
}

/// Resolve an import target relative to the importing file, implying the
/// `.less` extension when none is given
fn resolve_import(importing: &Path, target: &str) -> PathBuf {
    let mut path = importing
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(target);
    if path.extension().is_none() {
        path.set_extension("less");
    }
    path
}

/// Write compiled CSS via a temp file in the destination directory, so a
/// failed compile or interrupted write never truncates the destination
fn write_output(dest: &Path, content: &str) -> LesswatchResult<()> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(dest).map_err(|e| LesswatchError::Io(e.error))?;
    Ok(())
}
