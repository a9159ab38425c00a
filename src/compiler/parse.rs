//! LESS source parser
//!
//! Recursive descent over the raw text with line/column tracking. The
//! accepted subset covers variable declarations, nested rule blocks,
//! plain declarations, `@import` statements, and both comment styles.

/// 1-indexed source position for error locators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

/// One parsed stylesheet item
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `@name: value;`
    Variable {
        name: String,
        value: String,
        pos: Pos,
    },
    /// `property: value;`
    Declaration {
        property: String,
        value: String,
        pos: Pos,
    },
    /// `selector, selector { ... }`
    Rule {
        selectors: Vec<String>,
        items: Vec<Item>,
        pos: Pos,
    },
    /// `@import "path";` (top level only)
    Import { target: String, pos: Pos },
}

/// Parse failure with a locator, mapped to a compile error by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub pos: Pos,
    pub message: String,
}

impl ParseError {
    fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

/// Parse a LESS source text into top-level items
pub fn parse(source: &str) -> Result<Vec<Item>, ParseError> {
    let mut scanner = Scanner::new(source);
    let mut items = Vec::new();

    loop {
        scanner.skip_trivia()?;
        match scanner.peek() {
            None => break,
            Some('}') => {
                return Err(ParseError::new(scanner.here(), "unexpected '}'"));
            }
            Some('@') => items.push(parse_at(&mut scanner, true)?),
            Some(_) => items.push(parse_prelude_item(&mut scanner)?),
        }
    }

    Ok(items)
}

/// Split on `sep` at the top nesting level, respecting quotes, parens
/// and brackets
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in s.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            _ if c == sep && depth == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Collapse whitespace runs outside quoted strings so multi-line
/// selectors and values render on one line
fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in s.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

/// What ended a prelude read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    OpenBrace,
    Semicolon,
    CloseBrace,
    Eof,
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    /// Skip whitespace, `//` line comments and `/* */` block comments
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    let start = self.here();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(ParseError::new(start, "unterminated block comment"));
                            }
                            Some('*') if self.peek2() == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Read raw text until an unquoted, top-depth `{`, `;` or `}` (or EOF).
    /// The terminator is returned unconsumed. Comments are skipped,
    /// quoted strings pass through verbatim.
    fn read_prelude(&mut self) -> Result<(String, Terminator), ParseError> {
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            match self.peek() {
                None => return Ok((text, Terminator::Eof)),
                Some('/') if self.peek2() == Some('/') || self.peek2() == Some('*') => {
                    self.skip_trivia()?;
                    // Keep tokens separated where a comment sat between them.
                    if !text.ends_with(char::is_whitespace) && !text.is_empty() {
                        text.push(' ');
                    }
                }
                Some(q @ ('"' | '\'')) => {
                    let start = self.here();
                    text.push(q);
                    self.bump();
                    loop {
                        match self.bump() {
                            None => {
                                return Err(ParseError::new(start, "unterminated string"));
                            }
                            Some(c) => {
                                text.push(c);
                                if c == q {
                                    break;
                                }
                            }
                        }
                    }
                }
                Some(c @ ('(' | '[')) => {
                    depth += 1;
                    text.push(c);
                    self.bump();
                }
                Some(c @ (')' | ']')) => {
                    depth = depth.saturating_sub(1);
                    text.push(c);
                    self.bump();
                }
                Some('{') if depth == 0 => return Ok((text, Terminator::OpenBrace)),
                Some(';') if depth == 0 => return Ok((text, Terminator::Semicolon)),
                Some('}') if depth == 0 => return Ok((text, Terminator::CloseBrace)),
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }
}

/// Parse an `@`-prefixed item: `@import "path";` or `@name: value;`
fn parse_at(scanner: &mut Scanner, top_level: bool) -> Result<Item, ParseError> {
    let pos = scanner.here();
    scanner.bump(); // '@'

    let name = scanner.read_ident();
    if name.is_empty() {
        return Err(ParseError::new(pos, "expected identifier after '@'"));
    }

    if name == "import" {
        if !top_level {
            return Err(ParseError::new(
                pos,
                "@import is only allowed at the top level",
            ));
        }
        return parse_import(scanner, pos);
    }

    scanner.skip_trivia()?;
    if scanner.peek() != Some(':') {
        return Err(ParseError::new(
            pos,
            format!("unsupported at-rule '@{name}' (expected '@{name}: value;')"),
        ));
    }
    scanner.bump(); // ':'

    let (raw, terminator) = scanner.read_prelude()?;
    match terminator {
        Terminator::OpenBrace => {
            return Err(ParseError::new(
                scanner.here(),
                format!("unexpected '{{' in value of variable '@{name}'"),
            ));
        }
        Terminator::Semicolon => {
            scanner.bump();
        }
        // A closing brace or EOF also ends the last variable of a block.
        Terminator::CloseBrace | Terminator::Eof => {}
    }

    let value = normalize_ws(raw.trim());
    if value.is_empty() {
        return Err(ParseError::new(
            pos,
            format!("empty value for variable '@{name}'"),
        ));
    }

    Ok(Item::Variable { name, value, pos })
}

fn parse_import(scanner: &mut Scanner, pos: Pos) -> Result<Item, ParseError> {
    scanner.skip_trivia()?;

    let quote = match scanner.peek() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            return Err(ParseError::new(
                scanner.here(),
                "expected quoted path after @import",
            ));
        }
    };
    let start = scanner.here();
    scanner.bump();

    let mut target = String::new();
    loop {
        match scanner.bump() {
            None => return Err(ParseError::new(start, "unterminated string")),
            Some(c) if c == quote => break,
            Some(c) => target.push(c),
        }
    }

    if target.is_empty() {
        return Err(ParseError::new(start, "empty @import path"));
    }

    scanner.skip_trivia()?;
    if scanner.peek() != Some(';') {
        return Err(ParseError::new(
            scanner.here(),
            "expected ';' after @import",
        ));
    }
    scanner.bump();

    Ok(Item::Import { target, pos })
}

/// Parse a rule (`selector { ... }`) or a declaration (`prop: value;`)
fn parse_prelude_item(scanner: &mut Scanner) -> Result<Item, ParseError> {
    let pos = scanner.here();
    let (raw, terminator) = scanner.read_prelude()?;

    match terminator {
        Terminator::OpenBrace => {
            let open_pos = scanner.here();
            scanner.bump(); // '{'

            let mut selectors = Vec::new();
            for part in split_top_level(&raw, ',') {
                let selector = normalize_ws(part.trim());
                if selector.is_empty() {
                    return Err(ParseError::new(pos, "empty selector"));
                }
                selectors.push(selector);
            }

            let items = parse_block(scanner, open_pos)?;
            Ok(Item::Rule {
                selectors,
                items,
                pos,
            })
        }
        Terminator::Semicolon => {
            scanner.bump();
            declaration_from(&raw, pos)
        }
        // Last declaration of a block may omit the trailing ';'.
        Terminator::CloseBrace | Terminator::Eof => declaration_from(&raw, pos),
    }
}

/// Parse the body of a rule after its opening `{`
fn parse_block(scanner: &mut Scanner, open_pos: Pos) -> Result<Vec<Item>, ParseError> {
    let mut items = Vec::new();

    loop {
        scanner.skip_trivia()?;
        match scanner.peek() {
            None => {
                return Err(ParseError::new(open_pos, "unclosed block: missing '}'"));
            }
            Some('}') => {
                scanner.bump();
                return Ok(items);
            }
            Some('@') => items.push(parse_at(scanner, false)?),
            Some(_) => items.push(parse_prelude_item(scanner)?),
        }
    }
}

fn declaration_from(raw: &str, pos: Pos) -> Result<Item, ParseError> {
    let Some((property, value)) = raw.split_once(':') else {
        return Err(ParseError::new(
            pos,
            "expected ':' in declaration or '{' after selector",
        ));
    };

    let property = property.trim().to_string();
    if property.is_empty() {
        return Err(ParseError::new(pos, "missing property name"));
    }

    let value = normalize_ws(value.trim());
    if value.is_empty() {
        return Err(ParseError::new(
            pos,
            format!("missing value in declaration '{property}'"),
        ));
    }

    Ok(Item::Declaration {
        property,
        value,
        pos,
    })
}
