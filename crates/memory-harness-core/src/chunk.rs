//! Structural code chunker.
//!
//! Splits a source file into [`CodeChunk`]s that can be embedded and
//! retrieved independently. Python files get a structural parse; every
//! other language (and any Python file that fails to parse) becomes a
//! single whole-file chunk.
//!
//! # Python chunks
//!
//! | Chunk | Span |
//! |-------|------|
//! | `file_header` | The module docstring statement |
//! | `import_block` | First top-level import through the last one |
//! | `function` / `method` | `def` line through the last code line of its body |
//! | `class` | Header line through the end of the class docstring |
//!
//! Chunks are ordered header, imports, then definitions by start line.
//!
//! # Parser
//!
//! The parser is a line scanner rather than a full grammar. It groups
//! physical lines into logical statements (tracking brackets, string
//! literals and backslash continuations), then nests statements into
//! blocks by indentation. That is enough to locate definitions, their
//! bodies and their docstrings. Anything the scanner cannot make sense of
//! (unterminated strings or brackets, a block header with no body,
//! inconsistent dedents) is reported as a parse error and the file falls
//! back to a whole-file chunk.
//!
//! ```rust
//! use memory_harness_core::chunk::CodeChunker;
//! use memory_harness_core::models::ChunkType;
//!
//! let src = "import os\n\ndef main():\n    return os.getcwd()\n";
//! let chunks = CodeChunker::default().chunk(src, "app.py", "python");
//! assert_eq!(chunks[0].chunk_type, ChunkType::ImportBlock);
//! assert_eq!(chunks[1].name.as_deref(), Some("main"));
//! ```

use std::path::Path;

use tracing::debug;

use crate::models::{ChunkType, CodeChunk};

/// Default maximum number of lines kept in a whole-file chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 500;

/// Map a file path to a language name by extension. Unknown → `"text"`.
pub fn detect_language(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "py" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        "sh" => "shell",
        "sql" => "sql",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "toml" => "toml",
        "md" => "markdown",
        _ => "text",
    }
}

/// Splits source files into [`CodeChunk`]s.
#[derive(Debug, Clone)]
pub struct CodeChunker {
    /// Maximum number of lines kept in a whole-file chunk.
    pub max_chunk_size: usize,
}

impl Default for CodeChunker {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl CodeChunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    /// Chunk a file. Never fails; whitespace-only content yields no chunks.
    pub fn chunk(&self, content: &str, file_path: &str, language: &str) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        if language != "python" {
            return vec![self.fallback_chunk(content, file_path, language)];
        }
        match chunk_python(content, file_path) {
            Ok(chunks) if !chunks.is_empty() => chunks,
            Ok(_) => vec![self.fallback_chunk(content, file_path, language)],
            Err(e) => {
                debug!(file = file_path, error = %e, "python parse failed, using whole-file chunk");
                vec![self.fallback_chunk(content, file_path, language)]
            }
        }
    }

    /// One `file` chunk covering the whole file, truncated past
    /// `max_chunk_size` lines.
    pub fn fallback_chunk(&self, content: &str, file_path: &str, language: &str) -> CodeChunk {
        let lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len();
        let body = if total > self.max_chunk_size {
            format!(
                "{}\n\n... ({} more lines)",
                lines[..self.max_chunk_size].join("\n"),
                total - self.max_chunk_size
            )
        } else {
            content.to_string()
        };
        CodeChunk::new(body, ChunkType::File, 1, total, file_path, language)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Python structure
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("unterminated string literal at line {0}")]
    UnterminatedString(usize),
    #[error("unbalanced closing bracket at line {0}")]
    UnbalancedBracket(usize),
    #[error("unexpected end of file inside a statement starting at line {0}")]
    UnexpectedEof(usize),
    #[error("expected an indented block after line {0}")]
    ExpectedIndent(usize),
    #[error("unexpected indent at line {0}")]
    UnexpectedIndent(usize),
    #[error("unindent does not match any outer indentation level at line {0}")]
    InconsistentDedent(usize),
}

/// A logical statement: one or more physical lines.
#[derive(Debug, Clone)]
pub(crate) struct Stmt {
    pub(crate) start: usize,
    pub(crate) end: usize,
    indent: usize,
    /// Source text with comments and continuation backslashes removed.
    pub(crate) code: String,
}

impl Stmt {
    pub(crate) fn text(&self) -> &str {
        self.code.trim()
    }

    fn opens_block(&self) -> bool {
        self.code.trim_end().ends_with(':')
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) stmt: usize,
    pub(crate) children: Vec<Node>,
}

#[derive(Clone, Copy)]
struct OpenString {
    quote: char,
    triple: bool,
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            '\x0c' => width = 0,
            _ => break,
        }
    }
    width
}

/// Group physical lines into logical statements.
pub(crate) fn scan_statements(lines: &[&str]) -> Result<Vec<Stmt>, ParseError> {
    let mut stmts = Vec::new();
    let mut current: Option<Stmt> = None;
    let mut depth: usize = 0;
    let mut open: Option<OpenString> = None;

    for (i, raw) in lines.iter().enumerate() {
        let lineno = i + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(stmt) = current.as_mut() {
            stmt.code.push('\n');
        } else {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            current = Some(Stmt {
                start: lineno,
                end: lineno,
                indent: indent_width(line),
                code: String::new(),
            });
        }
        let Some(stmt) = current.as_mut() else {
            continue;
        };

        let chars: Vec<char> = line.chars().collect();
        let mut j = 0;
        let mut continued = false;
        let mut escaped_eol = false;

        while j < chars.len() {
            let c = chars[j];

            if let Some(s) = open {
                if c == '\\' {
                    stmt.code.push(c);
                    if let Some(&next) = chars.get(j + 1) {
                        stmt.code.push(next);
                    } else {
                        escaped_eol = true;
                    }
                    j += 2;
                    continue;
                }
                if c == s.quote {
                    if !s.triple {
                        stmt.code.push(c);
                        open = None;
                        j += 1;
                        continue;
                    }
                    if chars.get(j + 1) == Some(&c) && chars.get(j + 2) == Some(&c) {
                        stmt.code.extend([c, c, c]);
                        open = None;
                        j += 3;
                        continue;
                    }
                }
                stmt.code.push(c);
                j += 1;
                continue;
            }

            match c {
                '#' => break,
                '\'' | '"' => {
                    let triple = chars.get(j + 1) == Some(&c) && chars.get(j + 2) == Some(&c);
                    open = Some(OpenString { quote: c, triple });
                    if triple {
                        stmt.code.extend([c, c, c]);
                        j += 3;
                        continue;
                    }
                }
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or(ParseError::UnbalancedBracket(lineno))?;
                }
                '\\' if j + 1 == chars.len() => {
                    continued = true;
                    j += 1;
                    continue;
                }
                _ => {}
            }
            stmt.code.push(c);
            j += 1;
        }

        match open {
            Some(s) if !s.triple && !escaped_eol => {
                return Err(ParseError::UnterminatedString(lineno));
            }
            Some(_) => continue,
            None => {}
        }
        if depth > 0 || continued {
            continue;
        }

        stmt.end = lineno;
        if let Some(done) = current.take() {
            stmts.push(done);
        }
    }

    match current {
        Some(stmt) => Err(ParseError::UnexpectedEof(stmt.start)),
        None => Ok(stmts),
    }
}

/// Nest statements into blocks by indentation.
pub(crate) fn parse_block(stmts: &[Stmt], pos: &mut usize, indent: usize) -> Result<Vec<Node>, ParseError> {
    let mut nodes = Vec::new();
    while let Some(stmt) = stmts.get(*pos) {
        if stmt.indent < indent {
            break;
        }
        if stmt.indent > indent {
            return Err(ParseError::UnexpectedIndent(stmt.start));
        }
        let index = *pos;
        *pos += 1;

        let mut children = Vec::new();
        if stmt.opens_block() {
            let body_indent = match stmts.get(*pos) {
                Some(next) if next.indent > indent => next.indent,
                _ => return Err(ParseError::ExpectedIndent(stmt.end)),
            };
            children = parse_block(stmts, pos, body_indent)?;
            if let Some(next) = stmts.get(*pos) {
                if next.indent > indent {
                    return Err(ParseError::InconsistentDedent(next.start));
                }
            }
        }
        nodes.push(Node {
            stmt: index,
            children,
        });
    }
    Ok(nodes)
}

fn node_end(node: &Node, stmts: &[Stmt]) -> usize {
    match node.children.last() {
        Some(last) => node_end(last, stmts),
        None => stmts[node.stmt].end,
    }
}

/// `rest` of `code` after keyword `kw` followed by whitespace.
pub(crate) fn after_keyword<'a>(code: &'a str, kw: &str) -> Option<&'a str> {
    let rest = code.strip_prefix(kw)?;
    rest.starts_with(char::is_whitespace)
        .then(|| rest.trim_start())
}

fn identifier(s: &str) -> Option<String> {
    let name: String = s
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

pub(crate) fn def_name(code: &str) -> Option<String> {
    let rest = after_keyword(code, "async").unwrap_or(code);
    identifier(after_keyword(rest, "def")?)
}

pub(crate) fn class_name(code: &str) -> Option<String> {
    identifier(after_keyword(code, "class")?)
}

pub(crate) fn is_import(code: &str) -> bool {
    after_keyword(code, "import").is_some() || after_keyword(code, "from").is_some()
}

/// Value of a statement consisting only of (adjacent) string literals.
///
/// Only plain and `r`/`u`-prefixed literals qualify; f-strings and bytes
/// are not docstrings.
fn string_literal_value(code: &str) -> Option<String> {
    let mut rest = code.trim();
    if rest.is_empty() {
        return None;
    }
    let mut value = String::new();
    while !rest.is_empty() {
        let mut raw = false;
        let mut chars = rest.char_indices();
        let (_, first) = chars.next()?;
        let mut body_start = 0;
        let quote = match first {
            '\'' | '"' => first,
            'r' | 'R' | 'u' | 'U' => {
                raw = matches!(first, 'r' | 'R');
                let (idx, q) = chars.next()?;
                if q != '\'' && q != '"' {
                    return None;
                }
                body_start = idx;
                q
            }
            _ => return None,
        };
        let lit = &rest[body_start..];
        let triple_delim: String = [quote; 3].iter().collect();
        let (delim, inner) = if lit.starts_with(&triple_delim) {
            (triple_delim.as_str(), &lit[3..])
        } else {
            (&lit[..1], &lit[1..])
        };

        let close = find_closing(inner, delim)?;
        let body = &inner[..close];
        if raw {
            value.push_str(body);
        } else {
            value.push_str(&unescape(body));
        }
        rest = inner[close + delim.len()..].trim_start();
    }
    Some(value)
}

/// Byte offset of the unescaped closing delimiter.
fn find_closing(s: &str, delim: &str) -> Option<usize> {
    let mut iter = s.char_indices();
    while let Some((i, c)) = iter.next() {
        if c == '\\' {
            iter.next();
            continue;
        }
        if s[i..].starts_with(delim) {
            return Some(i);
        }
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0;
    for c in line.chars() {
        if c == '\t' {
            let next = (col / 8 + 1) * 8;
            out.extend(std::iter::repeat(' ').take(next - col));
            col = next;
        } else {
            out.push(c);
            col += 1;
        }
    }
    out
}

/// Strip docstring indentation the way Python's `inspect.cleandoc` does.
fn clean_docstring(doc: &str) -> String {
    let lines: Vec<String> = doc.split('\n').map(expand_tabs).collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            cleaned.push(line.trim_start().to_string());
        } else {
            cleaned.push(line.chars().skip(margin).collect::<String>().trim_end().to_string());
        }
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    cleaned.join("\n")
}

/// Docstring statement at the head of a block, if any.
fn block_docstring<'a>(children: &[Node], stmts: &'a [Stmt]) -> Option<(&'a Stmt, String)> {
    let first = &stmts[children.first()?.stmt];
    let value = string_literal_value(first.text())?;
    Some((first, clean_docstring(&value)))
}

struct Collector<'a> {
    lines: &'a [&'a str],
    stmts: &'a [Stmt],
    file_path: &'a str,
    definitions: Vec<CodeChunk>,
}

impl Collector<'_> {
    fn span(&self, start: usize, end: usize) -> String {
        self.lines[start - 1..end]
            .iter()
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn walk(&mut self, nodes: &[Node], enclosing_class: Option<&str>) {
        let stmts = self.stmts;
        for node in nodes {
            let stmt = &stmts[node.stmt];
            let code = stmt.text();

            if let Some(name) = def_name(code) {
                let end = node_end(node, stmts);
                let docstring = block_docstring(&node.children, stmts).map(|(_, d)| d);
                let chunk_type = if enclosing_class.is_some() {
                    ChunkType::Method
                } else {
                    ChunkType::Function
                };
                let chunk = CodeChunk::new(
                    self.span(stmt.start, end),
                    chunk_type,
                    stmt.start,
                    end,
                    self.file_path,
                    "python",
                )
                .with_name(name)
                .with_parent_class(enclosing_class.map(str::to_string))
                .with_docstring(docstring);
                self.definitions.push(chunk);
                self.walk(&node.children, None);
            } else if let Some(name) = class_name(code) {
                let (end, docstring) = match block_docstring(&node.children, stmts) {
                    Some((doc_stmt, doc)) => (doc_stmt.end, Some(doc)),
                    None => (stmt.end, None),
                };
                let chunk = CodeChunk::new(
                    self.span(stmt.start, end),
                    ChunkType::Class,
                    stmt.start,
                    end,
                    self.file_path,
                    "python",
                )
                .with_name(name.clone())
                .with_docstring(docstring);
                self.definitions.push(chunk);
                self.walk(&node.children, Some(&name));
            } else {
                self.walk(&node.children, None);
            }
        }
    }
}

fn chunk_python(content: &str, file_path: &str) -> Result<Vec<CodeChunk>, ParseError> {
    let lines: Vec<&str> = content.split('\n').collect();
    let stmts = scan_statements(&lines)?;
    let mut pos = 0;
    let tree = parse_block(&stmts, &mut pos, 0)?;

    let mut collector = Collector {
        lines: &lines,
        stmts: &stmts,
        file_path,
        definitions: Vec::new(),
    };
    let mut chunks = Vec::new();

    if let Some((doc_stmt, doc)) = block_docstring(&tree, &stmts) {
        chunks.push(
            CodeChunk::new(
                collector.span(doc_stmt.start, doc_stmt.end),
                ChunkType::FileHeader,
                doc_stmt.start,
                doc_stmt.end,
                file_path,
                "python",
            )
            .with_docstring(Some(doc)),
        );
    }

    let imports: Vec<&Stmt> = tree
        .iter()
        .map(|n| &stmts[n.stmt])
        .filter(|s| is_import(s.text()))
        .collect();
    if let (Some(first), Some(last)) = (imports.first(), imports.last()) {
        chunks.push(CodeChunk::new(
            collector.span(first.start, last.end),
            ChunkType::ImportBlock,
            first.start,
            last.end,
            file_path,
            "python",
        ));
    }

    collector.walk(&tree, None);
    let mut definitions = std::mem::take(&mut collector.definitions);
    definitions.sort_by_key(|c| c.start_line);
    chunks.extend(definitions);
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(chunks: &[CodeChunk]) -> Vec<ChunkType> {
        chunks.iter().map(|c| c.chunk_type).collect()
    }

    const SAMPLE: &str = r#""""Service module.

    Handles jobs.
"""

import os
from typing import (
    List,
    Optional,
)


class Job:
    """A unit of work."""

    def __init__(self, name):
        self.name = name

    async def run(self):
        """Run the job."""
        return os.getcwd()


def helper(items: List[str]) -> Optional[str]:
    # comment inside
    text = "has # hash and ) paren"
    return items[0] if items else None

    # trailing comment
"#;

    #[test]
    fn test_python_structure() {
        let chunks = CodeChunker::default().chunk(SAMPLE, "svc.py", "python");
        assert_eq!(
            types(&chunks),
            vec![
                ChunkType::FileHeader,
                ChunkType::ImportBlock,
                ChunkType::Class,
                ChunkType::Method,
                ChunkType::Method,
                ChunkType::Function,
            ]
        );

        let header = &chunks[0];
        assert_eq!((header.start_line, header.end_line), (1, 4));
        assert_eq!(header.docstring.as_deref(), Some("Service module.\n\nHandles jobs."));

        let imports = &chunks[1];
        assert_eq!((imports.start_line, imports.end_line), (6, 10));
        assert!(imports.content.ends_with(")"));

        let class = &chunks[2];
        assert_eq!(class.name.as_deref(), Some("Job"));
        assert_eq!((class.start_line, class.end_line), (13, 14));
        assert_eq!(class.docstring.as_deref(), Some("A unit of work."));

        let init = &chunks[3];
        assert_eq!(init.name.as_deref(), Some("__init__"));
        assert_eq!(init.parent_class.as_deref(), Some("Job"));
        assert_eq!((init.start_line, init.end_line), (16, 17));

        let run = &chunks[4];
        assert_eq!(run.name.as_deref(), Some("run"));
        assert_eq!(run.docstring.as_deref(), Some("Run the job."));
        assert_eq!((run.start_line, run.end_line), (19, 21));

        let helper = &chunks[5];
        assert_eq!(helper.parent_class, None);
        assert_eq!((helper.start_line, helper.end_line), (24, 27));
    }

    #[test]
    fn test_class_and_method_spans_do_not_overlap() {
        let chunks = CodeChunker::default().chunk(SAMPLE, "svc.py", "python");
        let class = chunks.iter().find(|c| c.chunk_type == ChunkType::Class).unwrap();
        for method in chunks.iter().filter(|c| c.chunk_type == ChunkType::Method) {
            assert!(method.start_line > class.end_line);
        }
    }

    #[test]
    fn test_three_functions_and_imports() {
        let src = "import a\nimport b\n\ndef one():\n    pass\n\ndef two():\n    pass\n\ndef three():\n    return 3\n";
        let chunks = CodeChunker::default().chunk(src, "f.py", "python");
        assert_eq!(
            types(&chunks),
            vec![
                ChunkType::ImportBlock,
                ChunkType::Function,
                ChunkType::Function,
                ChunkType::Function,
            ]
        );
        assert_eq!(chunks[0].content, "import a\nimport b");
    }

    #[test]
    fn test_nested_function_is_function_not_method() {
        let src = "class A:\n    def outer(self):\n        def inner():\n            return 1\n        return inner\n";
        let chunks = CodeChunker::default().chunk(src, "n.py", "python");
        let inner = chunks.iter().find(|c| c.name.as_deref() == Some("inner")).unwrap();
        assert_eq!(inner.chunk_type, ChunkType::Function);
        let outer = chunks.iter().find(|c| c.name.as_deref() == Some("outer")).unwrap();
        assert_eq!(outer.chunk_type, ChunkType::Method);
        assert_eq!(outer.end_line, 5);
    }

    #[test]
    fn test_decorators_not_included() {
        let src = "@cache\ndef f():\n    return 1\n";
        let chunks = CodeChunker::default().chunk(src, "d.py", "python");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 2);
    }

    #[test]
    fn test_syntax_error_falls_back() {
        let src = "def broken(:\n    x = (1, 2\n";
        let chunks = CodeChunker::default().chunk(src, "b.py", "python");
        assert_eq!(types(&chunks), vec![ChunkType::File]);
        assert_eq!(chunks[0].content, src);
    }

    #[test]
    fn test_missing_body_falls_back() {
        let chunks = CodeChunker::default().chunk("def f():\nx = 1\n", "b.py", "python");
        assert_eq!(types(&chunks), vec![ChunkType::File]);
    }

    #[test]
    fn test_inconsistent_dedent_falls_back() {
        let src = "if x:\n        a = 1\n    b = 2\n";
        let chunks = CodeChunker::default().chunk(src, "b.py", "python");
        assert_eq!(types(&chunks), vec![ChunkType::File]);
    }

    #[test]
    fn test_plain_script_falls_back_to_file() {
        let chunks = CodeChunker::default().chunk("x = 1\nprint(x)\n", "s.py", "python");
        assert_eq!(types(&chunks), vec![ChunkType::File]);
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        assert!(CodeChunker::default().chunk("  \n\t\n", "e.py", "python").is_empty());
        assert!(CodeChunker::default().chunk("", "e.rs", "rust").is_empty());
    }

    #[test]
    fn test_fallback_truncation() {
        let src: String = (1..=12).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let chunker = CodeChunker::new(10);
        let chunks = chunker.chunk(&src, "big.rs", "rust");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_line, 12);
        assert!(chunks[0].content.ends_with("line 10\n\n... (2 more lines)"));
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("a/b.py"), "python");
        assert_eq!(detect_language("x.TSX"), "typescript");
        assert_eq!(detect_language("lib.rs"), "rust");
        assert_eq!(detect_language("README"), "text");
        assert_eq!(detect_language("notes.txt"), "text");
    }

    #[test]
    fn test_string_literal_value() {
        assert_eq!(string_literal_value("'a' \"b\""), Some("ab".into()));
        assert_eq!(string_literal_value("r'\\n'"), Some("\\n".into()));
        assert_eq!(string_literal_value("'''x\\'y'''"), Some("x'y".into()));
        assert_eq!(string_literal_value("f'x'"), None);
        assert_eq!(string_literal_value("'x'.strip()"), None);
    }

    #[test]
    fn test_clean_docstring() {
        assert_eq!(clean_docstring("  Title.\n\n    Body\n      more\n    "), "Title.\n\nBody\n  more");
    }

    #[test]
    fn test_inline_def_and_continuation() {
        let src = "def f(): return 1\n\nvalue = 1 + \\\n    2\n\ndef g():\n    s = 'a\\\nb'\n    return s\n";
        let chunks = CodeChunker::default().chunk(src, "i.py", "python");
        assert_eq!(types(&chunks), vec![ChunkType::Function, ChunkType::Function]);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 1));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (6, 9));
    }
}
