#![forbid(unsafe_code)]

//! Property path model and parser.
//!
//! A [`Path`] is an immutable sequence of [`PathSegment`]s parsed from text
//! such as `Nested.Items[0, "key"].Name`.
//!
//! # Grammar
//!
//! ```text
//! path     := "" | first ( "." ident | indexer )*
//! first    := ident | indexer
//! indexer  := "[" arg ( "," arg )* "]"
//! arg      := number | string | "true" | "false" | "null" | path
//! string   := '"' chars '"' | "'" chars "'"      (escapes: \\ \" \' \n \t)
//! ```
//!
//! Whitespace is allowed around separators. Nested path arguments are kept
//! as [`Path`]s and evaluated when the indexer is invoked, against the
//! original root rather than the indexed object.
//!
//! # Caching
//!
//! [`Path::parse`] memoizes successful parses process-wide by literal text.
//! Parsing is pure, so the cache only trades memory for repeated work.
//! Errors are never cached. The cache holds at most [`PATH_CACHE_CAPACITY`]
//! paths and is emptied when an insert would exceed that.
//!
//! # Invariants
//!
//! 1. A parsed path never changes.
//! 2. `Path::parse_uncached(&p.to_text())` equals `p` for every parsed `p`.
//! 3. Equality compares segments, not the original spelling.

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use ahash::AHashMap;

use crate::error::{BindError, Result};
use crate::member::INDEXER_MEMBER;
use crate::value::Value;

/// A literal indexer argument.
#[derive(Debug, Clone, PartialEq)]
pub enum PathLiteral {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl PathLiteral {
    /// Runtime value of the literal.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(n) => Value::Int(*n),
            Self::Float(x) => Value::Float(*x),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for PathLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// One indexer argument.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexArg {
    Literal(PathLiteral),
    /// A nested path resolved against the original root.
    Path(Path),
}

impl fmt::Display for IndexArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => fmt::Display::fmt(lit, f),
            Self::Path(path) => fmt::Display::fmt(path, f),
        }
    }
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// Named member access.
    Member(String),
    /// Indexer invocation with ordered arguments.
    Indexer(Vec<IndexArg>),
}

impl PathSegment {
    /// Name used to look the segment up in a member registry.
    #[must_use]
    pub fn member_name(&self) -> &str {
        match self {
            Self::Member(name) => name,
            Self::Indexer(_) => INDEXER_MEMBER,
        }
    }

    /// Indexer arguments; empty for member segments.
    #[must_use]
    pub fn args(&self) -> &[IndexArg] {
        match self {
            Self::Member(_) => &[],
            Self::Indexer(args) => args,
        }
    }
}

/// A parsed property path.
#[derive(Debug, Clone)]
pub struct Path {
    text: String,
    segments: Vec<PathSegment>,
}

/// Most paths [`Path::parse`] keeps cached at once.
pub const PATH_CACHE_CAPACITY: usize = 1024;

static CACHE: LazyLock<Mutex<PathCache>> =
    LazyLock::new(|| Mutex::new(PathCache::new(PATH_CACHE_CAPACITY)));

struct PathCache {
    capacity: usize,
    entries: AHashMap<String, Arc<Path>>,
}

impl PathCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: AHashMap::new(),
        }
    }

    fn get(&self, text: &str) -> Option<Arc<Path>> {
        self.entries.get(text).cloned()
    }

    /// Store `path` under `text` unless another parse got there first.
    fn insert(&mut self, text: &str, path: Arc<Path>) -> Arc<Path> {
        if let Some(existing) = self.entries.get(text) {
            return Arc::clone(existing);
        }
        if self.entries.len() >= self.capacity {
            tracing::trace!(evicted = self.entries.len(), "path cache cleared");
            self.entries.clear();
        }
        self.entries.insert(text.to_owned(), Arc::clone(&path));
        path
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Path {
    /// The empty path, which resolves to the root itself.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            segments: Vec::new(),
        }
    }

    /// Parse `text`, reusing a previously parsed path with the same text.
    pub fn parse(text: &str) -> Result<Arc<Self>> {
        let cached = CACHE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text);
        if let Some(path) = cached {
            return Ok(path);
        }
        let path = Arc::new(Self::parse_uncached(text)?);
        tracing::trace!(path = text, segments = path.len(), "path cache miss");
        Ok(CACHE
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text, path))
    }

    /// Parse `text` without consulting the cache.
    pub fn parse_uncached(text: &str) -> Result<Self> {
        let mut parser = Parser { src: text, pos: 0 };
        let segments = parser.chain(false)?;
        Ok(Self {
            text: text.to_owned(),
            segments,
        })
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Text the path was parsed from.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Canonical spelling.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Member(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Indexer(args) => {
                    f.write_str("[")?;
                    for (j, arg) in args.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        fmt::Display::fmt(arg, f)?;
                    }
                    f.write_str("]")?;
                }
            }
        }
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, reason: impl Into<String>) -> BindError {
        BindError::MalformedPath {
            path: self.src.to_owned(),
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn unexpected(&self, c: char) -> BindError {
        match c {
            ']' => self.error("unbalanced ']'"),
            '.' => self.error("empty segment name"),
            c => self.error(format!("unexpected character '{c}'")),
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        self.src[start..self.pos].to_owned()
    }

    /// Parse a segment chain. Nested chains stop before `,` or `]`.
    fn chain(&mut self, nested: bool) -> Result<Vec<PathSegment>> {
        let mut segments = Vec::new();
        self.skip_ws();
        match self.peek() {
            None if !nested => return Ok(segments),
            None => return Err(self.error("unbalanced '['")),
            Some('[') => segments.push(self.indexer()?),
            Some(c) if is_ident_start(c) => segments.push(PathSegment::Member(self.ident())),
            Some(c) => return Err(self.unexpected(c)),
        }
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',' | ']') if nested => break,
                Some('[') => segments.push(self.indexer()?),
                Some('.') => {
                    self.bump();
                    self.skip_ws();
                    match self.peek() {
                        Some(c) if is_ident_start(c) => {
                            segments.push(PathSegment::Member(self.ident()));
                        }
                        _ => return Err(self.error("empty segment name")),
                    }
                }
                Some(c) => return Err(self.unexpected(c)),
            }
        }
        Ok(segments)
    }

    fn indexer(&mut self) -> Result<PathSegment> {
        self.bump();
        self.skip_ws();
        if self.peek() == Some(']') {
            return Err(self.error("empty indexer"));
        }
        let mut args = Vec::new();
        loop {
            args.push(self.arg()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(']') => break,
                None => return Err(self.error("unbalanced '['")),
                Some(c) => {
                    self.pos -= c.len_utf8();
                    return Err(self.error(format!("unexpected character '{c}'")));
                }
            }
        }
        Ok(PathSegment::Indexer(args))
    }

    fn arg(&mut self) -> Result<IndexArg> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unbalanced '['")),
            Some(',' | ']') => Err(self.error("empty indexer argument")),
            Some(q @ ('"' | '\'')) => self.string(q).map(|s| IndexArg::Literal(PathLiteral::Str(s))),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number().map(IndexArg::Literal),
            Some(c) if is_ident_start(c) => {
                let start = self.pos;
                let word = self.ident();
                let keyword = match word.as_str() {
                    "true" => Some(PathLiteral::Bool(true)),
                    "false" => Some(PathLiteral::Bool(false)),
                    "null" => Some(PathLiteral::Null),
                    _ => None,
                };
                if let Some(lit) = keyword {
                    self.skip_ws();
                    if matches!(self.peek(), Some(',' | ']')) {
                        return Ok(IndexArg::Literal(lit));
                    }
                }
                self.pos = start;
                let segments = self.chain(true)?;
                let path = Path {
                    text: String::new(),
                    segments,
                };
                Ok(IndexArg::Path(Path {
                    text: path.to_text(),
                    segments: path.segments,
                }))
            }
            Some(c) => Err(self.unexpected(c)),
        }
    }

    fn string(&mut self, quote: char) -> Result<String> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('\'') => out.push('\''),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => return Err(self.error(format!("invalid escape '\\{c}'"))),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<PathLiteral> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        let mut is_float = false;
        let mut prev = '\0';
        while let Some(c) = self.peek() {
            let accept = match c {
                '0'..='9' => true,
                '.' | 'e' | 'E' => {
                    is_float = true;
                    true
                }
                '+' | '-' => matches!(prev, 'e' | 'E'),
                _ => false,
            };
            if !accept {
                break;
            }
            prev = c;
            self.bump();
        }
        let text = &self.src[start..self.pos];
        if is_float {
            match text.parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(PathLiteral::Float(x)),
                _ => Err(self.error(format!("invalid number '{text}'"))),
            }
        } else {
            text.parse::<i64>()
                .map(PathLiteral::Int)
                .map_err(|_| self.error(format!("invalid number '{text}'")))
        }
    }
}
