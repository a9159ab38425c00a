//! Variable resolution, nesting flattening and CSS emission
//!
//! Variables are lexically scoped: a block sees definitions from enclosing
//! blocks and may shadow them. Definitions are eager (define-before-use),
//! so a variable's value is fixed at its declaration site.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::parse::{Item, Pos};

/// Top-level items from one source file; imports split the entry file
/// into several chunks sharing one global scope
#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub file: PathBuf,
    pub items: Vec<Item>,
}

/// Evaluation failure with the file and locator of the offending item
#[derive(Debug, Clone)]
pub struct EvalError {
    pub file: PathBuf,
    pub pos: Pos,
    pub message: String,
}

impl EvalError {
    fn new(file: &Path, pos: Pos, message: impl Into<String>) -> Self {
        Self {
            file: file.to_path_buf(),
            pos,
            message: message.into(),
        }
    }
}

/// A flattened output rule
struct CssRule {
    selectors: Vec<String>,
    declarations: Vec<(String, String)>,
}

/// Stack of variable frames, innermost last
struct Scope {
    frames: Vec<HashMap<String, String>>,
}

impl Scope {
    fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn define(&mut self, name: &str, value: String) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).map(String::as_str))
    }
}

/// Evaluate parsed chunks into plain CSS text
pub fn evaluate(chunks: &[SourceChunk]) -> Result<String, EvalError> {
    let mut scope = Scope::new();
    let mut rules = Vec::new();

    for chunk in chunks {
        walk_items(&chunk.items, &[], &mut scope, &mut rules, &chunk.file)?;
    }

    Ok(render(&rules))
}

fn walk_items(
    items: &[Item],
    parents: &[String],
    scope: &mut Scope,
    rules: &mut Vec<CssRule>,
    file: &Path,
) -> Result<(), EvalError> {
    // Reserve this block's output rule up front so its declarations come
    // before any nested rules, in document order.
    let slot = if parents.is_empty() {
        None
    } else {
        rules.push(CssRule {
            selectors: parents.to_vec(),
            declarations: Vec::new(),
        });
        Some(rules.len() - 1)
    };

    for item in items {
        match item {
            Item::Variable { name, value, pos } => {
                let resolved = substitute(value, scope, file, *pos)?;
                scope.define(name, resolved);
            }
            Item::Declaration {
                property,
                value,
                pos,
            } => {
                let Some(slot) = slot else {
                    return Err(EvalError::new(
                        file,
                        *pos,
                        format!("declaration '{property}' outside of a rule"),
                    ));
                };
                let resolved = substitute(value, scope, file, *pos)?;
                rules[slot].declarations.push((property.clone(), resolved));
            }
            Item::Rule {
                selectors,
                items,
                pos,
            } => {
                if parents.is_empty() && selectors.iter().any(|s| s.contains('&')) {
                    return Err(EvalError::new(
                        file,
                        *pos,
                        "'&' has no parent selector at the top level",
                    ));
                }
                let combined = combine_selectors(parents, selectors);
                scope.push();
                walk_items(items, &combined, scope, rules, file)?;
                scope.pop();
            }
            Item::Import { pos, .. } => {
                return Err(EvalError::new(file, *pos, "unresolved @import"));
            }
        }
    }

    Ok(())
}

/// Cross-combine parent and child selector lists. `&` in a child refers
/// to the parent selector; otherwise descendant combination applies.
fn combine_selectors(parents: &[String], children: &[String]) -> Vec<String> {
    if parents.is_empty() {
        return children.to_vec();
    }

    let mut combined = Vec::with_capacity(parents.len() * children.len());
    for parent in parents {
        for child in children {
            if child.contains('&') {
                combined.push(child.replace('&', parent));
            } else {
                combined.push(format!("{parent} {child}"));
            }
        }
    }
    combined
}

/// Replace `@name` references in a value with their scoped definitions.
/// References inside quoted strings are left alone.
fn substitute(value: &str, scope: &Scope, file: &Path, pos: Pos) -> Result<String, EvalError> {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            '@' if chars
                .get(i + 1)
                .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_') =>
            {
                let mut end = i + 1;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric()
                        || chars[end] == '-'
                        || chars[end] == '_')
                {
                    end += 1;
                }
                let name: String = chars[i + 1..end].iter().collect();
                let Some(resolved) = scope.lookup(&name) else {
                    return Err(EvalError::new(
                        file,
                        pos,
                        format!("undefined variable '@{name}'"),
                    ));
                };
                out.push_str(resolved);
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Emit flattened rules as CSS, skipping rules with no declarations
fn render(rules: &[CssRule]) -> String {
    let mut css = String::new();

    for rule in rules.iter().filter(|r| !r.declarations.is_empty()) {
        if !css.is_empty() {
            css.push('\n');
        }
        css.push_str(&rule.selectors.join(",\n"));
        css.push_str(" {\n");
        for (property, value) in &rule.declarations {
            css.push_str("  ");
            css.push_str(property);
            css.push_str(": ");
            css.push_str(value);
            css.push_str(";\n");
        }
        css.push_str("}\n");
    }

    css
}
