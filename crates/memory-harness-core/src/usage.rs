//! Usage examples and the per-workspace relationship map.
//!
//! [`extract_relations`] reads a Python file with the chunker's statement
//! scanner and reports what it imports, what it defines, and every place an
//! imported name is loaded. Each load becomes a [`UsageExample`]: the line,
//! one line of context either side, and the enclosing definition.
//!
//! [`RelationshipMap`] keeps the import graph, definition sites and usage
//! sites in memory. It is advisory: everything in it can be rebuilt by
//! re-indexing, and usage examples themselves are stored as entries.
//!
//! ```rust
//! use memory_harness_core::usage::extract_relations;
//!
//! let src = "import json\n\ndef dump(x):\n    return json.dumps(x)\n";
//! let rel = extract_relations(src, "io.py", "python");
//! assert_eq!(rel.imports, vec!["json"]);
//! assert_eq!(rel.usages[0].target_name, "json");
//! assert_eq!(rel.usages[0].context, "function: dump");
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use serde_json::{json, Map};

use crate::chunk::{
    after_keyword, class_name, def_name, is_import, parse_block, scan_statements, Node, Stmt,
};
use crate::models::{now_ts, Category, Metadata};

/// `chunk_type` of stored usage example entries.
pub const USAGE_CHUNK_TYPE: &str = "usage_example";

/// One load of an imported name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageExample {
    pub target_name: String,
    /// The line plus one line either side.
    pub example_code: String,
    /// `module`, `function: f`, `class: C` or `method: C.m`.
    pub context: String,
    pub file_path: String,
    pub line_number: usize,
}

impl UsageExample {
    pub fn searchable_content(&self) -> String {
        format!(
            "# Usage of {} in {}:{} ({})\n{}",
            self.target_name, self.file_path, self.line_number, self.context, self.example_code
        )
    }

    pub fn metadata(&self, workspace: &str) -> Metadata {
        let mut md = Map::new();
        md.insert("type".into(), json!("code_usage"));
        md.insert("category".into(), json!(Category::Codebase.as_str()));
        md.insert("workspace".into(), json!(workspace));
        md.insert("file_path".into(), json!(self.file_path));
        md.insert("language".into(), json!("python"));
        md.insert("chunk_type".into(), json!(USAGE_CHUNK_TYPE));
        md.insert("target_name".into(), json!(self.target_name));
        md.insert("line_number".into(), json!(self.line_number));
        md.insert("start_line".into(), json!(self.line_number));
        md.insert("context".into(), json!(self.context));
        md.insert("timestamp".into(), json!(now_ts()));
        md
    }
}

/// What one file imports, defines and uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileRelations {
    /// Imported module paths, deduplicated, in first-seen order.
    pub imports: Vec<String>,
    /// Names of every `def` and `class`, in source order.
    pub definitions: Vec<String>,
    pub usages: Vec<UsageExample>,
}

/// Relations of a source file. Only Python is analysed; other languages
/// and unparseable files yield empty relations.
pub fn extract_relations(content: &str, file_path: &str, language: &str) -> FileRelations {
    if language != "python" {
        return FileRelations::default();
    }
    let lines: Vec<&str> = content.split('\n').collect();
    let Ok(stmts) = scan_statements(&lines) else {
        return FileRelations::default();
    };
    let mut pos = 0;
    let Ok(tree) = parse_block(&stmts, &mut pos, 0) else {
        return FileRelations::default();
    };

    let mut relations = FileRelations::default();
    let mut bound: HashSet<String> = HashSet::new();
    for stmt in &stmts {
        let code = stmt.text();
        if is_import(code) {
            for module in imported_modules(code) {
                if !relations.imports.contains(&module) {
                    relations.imports.push(module);
                }
            }
            bound.extend(import_bindings(code));
        } else if let Some(name) = def_name(code).or_else(|| class_name(code)) {
            relations.definitions.push(name);
        }
    }
    for name in &relations.definitions {
        bound.remove(name);
    }
    if bound.is_empty() {
        return relations;
    }

    let mut walker = UsageWalker {
        lines: &lines,
        stmts: &stmts,
        targets: &bound,
        file_path,
        seen: HashSet::new(),
        usages: Vec::new(),
    };
    for node in &tree {
        walker.top_level(node);
    }
    relations.usages = walker.usages;
    relations.usages.sort_by_key(|u| u.line_number);
    relations
}

/// Module paths named by an import statement.
fn imported_modules(code: &str) -> Vec<String> {
    if let Some(rest) = after_keyword(code, "from") {
        return rest
            .split_whitespace()
            .next()
            .map(|m| vec![m.to_string()])
            .unwrap_or_default();
    }
    after_keyword(code, "import")
        .map(|rest| {
            aliases(rest)
                .filter_map(|alias| alias.split_whitespace().next().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Local names an import statement binds.
fn import_bindings(code: &str) -> Vec<String> {
    let (names, from_import) = match after_keyword(code, "from") {
        Some(rest) => match rest.split_once(" import ") {
            Some((_, names)) => (names, true),
            None => return Vec::new(),
        },
        None => match after_keyword(code, "import") {
            Some(names) => (names, false),
            None => return Vec::new(),
        },
    };
    aliases(names)
        .filter_map(|alias| {
            let mut parts = alias.split_whitespace();
            let name = parts.next()?;
            match (parts.next(), parts.next()) {
                (Some("as"), Some(asname)) => Some(asname.to_string()),
                _ if name == "*" => None,
                // `import a.b` binds `a`.
                _ if !from_import => name.split('.').next().map(str::to_string),
                _ => Some(name.to_string()),
            }
        })
        .collect()
}

fn aliases(list: &str) -> impl Iterator<Item = &str> {
    list.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
}

struct UsageWalker<'a> {
    lines: &'a [&'a str],
    stmts: &'a [Stmt],
    targets: &'a HashSet<String>,
    file_path: &'a str,
    seen: HashSet<(String, usize)>,
    usages: Vec<UsageExample>,
}

impl UsageWalker<'_> {
    fn top_level(&mut self, node: &Node) {
        let code = self.stmts[node.stmt].text();
        if let Some(name) = def_name(code) {
            self.subtree(node, &format!("function: {}", name));
        } else if let Some(class) = class_name(code) {
            let class_ctx = format!("class: {}", class);
            self.statement(node.stmt, &class_ctx);
            for child in &node.children {
                match def_name(self.stmts[child.stmt].text()) {
                    Some(method) => self.subtree(child, &format!("method: {}.{}", class, method)),
                    None => self.subtree(child, &class_ctx),
                }
            }
        } else {
            self.subtree(node, "module");
        }
    }

    fn subtree(&mut self, node: &Node, context: &str) {
        self.statement(node.stmt, context);
        for child in &node.children {
            self.subtree(child, context);
        }
    }

    fn statement(&mut self, index: usize, context: &str) {
        let stmt = &self.stmts[index];
        if is_import(stmt.text()) {
            return;
        }
        for (name, offset) in loaded_names(&stmt.code) {
            if !self.targets.contains(&name) {
                continue;
            }
            let line_number = stmt.start + offset;
            if !self.seen.insert((name.clone(), line_number)) {
                continue;
            }
            let start = line_number.saturating_sub(2);
            let end = (line_number + 1).min(self.lines.len());
            let example_code = self.lines[start..end]
                .iter()
                .map(|l| l.strip_suffix('\r').unwrap_or(l))
                .collect::<Vec<_>>()
                .join("\n");
            self.usages.push(UsageExample {
                target_name: name,
                example_code,
                context: context.to_string(),
                file_path: self.file_path.to_string(),
                line_number,
            });
        }
    }
}

/// Identifiers read by a statement, with their line offset inside it.
///
/// Skips string literals, attribute names (`x.name`) and names directly
/// followed by a single `=` (assignment targets and keyword arguments).
fn loaded_names(code: &str) -> Vec<(String, usize)> {
    let chars: Vec<char> = code.chars().collect();
    let mut out = Vec::new();
    let mut line = 0;
    let mut i = 0;
    let mut prev_significant: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '\'' || c == '"' {
            i = skip_string(&chars, i, &mut line);
            prev_significant = Some(c);
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            // String prefix such as f"..." or rb'...'.
            if matches!(chars.get(i), Some('\'') | Some('"')) {
                prev_significant = Some('"');
                continue;
            }
            let mut j = i;
            while j < chars.len() && chars[j] == ' ' {
                j += 1;
            }
            let assigned = chars.get(j) == Some(&'=') && chars.get(j + 1) != Some(&'=');
            if prev_significant != Some('.') && !assigned {
                out.push((name, line));
            }
            prev_significant = Some('a');
            continue;
        }
        prev_significant = Some(c);
        i += 1;
    }
    out
}

/// Index just past the string literal opening at `start`.
fn skip_string(chars: &[char], start: usize, line: &mut usize) -> usize {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let mut i = start + if triple { 3 } else { 1 };
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' => {
                *line += 1;
                i += 1;
            }
            c if c == quote => {
                if !triple {
                    return i + 1;
                }
                if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                    return i + 3;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// Import graph, definition sites and usage sites of one workspace.
#[derive(Debug, Clone, Default)]
pub struct RelationshipMap {
    imports: BTreeMap<String, BTreeSet<String>>,
    definitions: BTreeMap<String, BTreeSet<String>>,
    usages: BTreeMap<String, BTreeSet<String>>,
}

impl RelationshipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `relations` for `file_path`, replacing what was known about it.
    pub fn add_file(&mut self, file_path: &str, relations: &FileRelations) {
        self.remove_file(file_path);
        if !relations.imports.is_empty() {
            self.imports.insert(
                file_path.to_string(),
                relations.imports.iter().cloned().collect(),
            );
        }
        for name in &relations.definitions {
            self.definitions
                .entry(name.clone())
                .or_default()
                .insert(file_path.to_string());
        }
        for usage in &relations.usages {
            self.usages
                .entry(usage.target_name.clone())
                .or_default()
                .insert(file_path.to_string());
        }
    }

    pub fn remove_file(&mut self, file_path: &str) {
        self.imports.remove(file_path);
        for files in self
            .definitions
            .values_mut()
            .chain(self.usages.values_mut())
        {
            files.remove(file_path);
        }
        self.definitions.retain(|_, files| !files.is_empty());
        self.usages.retain(|_, files| !files.is_empty());
    }

    /// Modules `file_path` imports.
    pub fn dependencies(&self, file_path: &str) -> Vec<String> {
        self.imports
            .get(file_path)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Files that import `file_path` as a module or use a name it defines.
    pub fn dependents(&self, file_path: &str) -> Vec<String> {
        let module = module_path(file_path);
        let mut out: BTreeSet<String> = self
            .imports
            .iter()
            .filter(|(other, modules)| {
                other.as_str() != file_path
                    && modules.iter().any(|m| module_matches(m, &module))
            })
            .map(|(other, _)| other.clone())
            .collect();
        for (name, files) in &self.definitions {
            if files.contains(file_path) {
                if let Some(users) = self.usages.get(name) {
                    out.extend(users.iter().filter(|u| u.as_str() != file_path).cloned());
                }
            }
        }
        out.into_iter().collect()
    }

    /// Files where `component` is used.
    pub fn component_usage(&self, component: &str) -> Vec<String> {
        self.usages
            .get(component)
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Files defining `component`.
    pub fn defined_in(&self, component: &str) -> Vec<String> {
        self.definitions
            .get(component)
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Imported modules with the number of files importing each, most
    /// imported first.
    pub fn most_imported(&self, limit: usize) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for modules in self.imports.values() {
            for m in modules {
                *counts.entry(m.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> =
            counts.into_iter().map(|(m, n)| (m.to_string(), n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.definitions.is_empty() && self.usages.is_empty()
    }
}

/// `pkg/tools.py` → `pkg.tools`.
fn module_path(file_path: &str) -> String {
    let trimmed = file_path.trim_start_matches("./");
    let stem = trimmed
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(trimmed);
    stem.trim_end_matches("/__init__").replace('/', ".")
}

/// `import tools` or `from .tools import x` names `pkg.tools`, and so does
/// `import pkg.tools`.
fn module_matches(imported: &str, module: &str) -> bool {
    let imported = imported.trim_start_matches('.');
    !imported.is_empty()
        && (imported == module
            || module.ends_with(&format!(".{}", imported))
            || imported.ends_with(&format!(".{}", module)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
import os
import numpy as np
from pkg.store import (Store, open_store as open_db)
from helpers import *


def load(path):
    return Store(os.path.join(path, \"db\"))


class Cache:
    backend = np.zeros(3)

    def get(self, key):
        handle = open_db(key)
        return handle


def Store_name():
    text = \"os and np\"
    os = 1
    return text
";

    #[test]
    fn test_imports_and_definitions() {
        let rel = extract_relations(SAMPLE, "pkg/cache.py", "python");
        assert_eq!(rel.imports, vec!["os", "numpy", "pkg.store", "helpers"]);
        assert_eq!(rel.definitions, vec!["load", "Cache", "get", "Store_name"]);
    }

    #[test]
    fn test_usages_with_context() {
        let rel = extract_relations(SAMPLE, "pkg/cache.py", "python");
        let found: Vec<(&str, usize, &str)> = rel
            .usages
            .iter()
            .map(|u| (u.target_name.as_str(), u.line_number, u.context.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("Store", 8, "function: load"),
                ("os", 8, "function: load"),
                ("np", 12, "class: Cache"),
                ("open_db", 15, "method: Cache.get"),
            ]
        );
    }

    #[test]
    fn test_example_code_spans_neighbouring_lines() {
        let rel = extract_relations(SAMPLE, "pkg/cache.py", "python");
        let open_db = rel.usages.iter().find(|u| u.target_name == "open_db").unwrap();
        assert_eq!(
            open_db.example_code,
            "    def get(self, key):\n        handle = open_db(key)\n        return handle"
        );
        let md = open_db.metadata("ws");
        assert_eq!(md["chunk_type"], json!(USAGE_CHUNK_TYPE));
        assert_eq!(md["target_name"], json!("open_db"));
        assert_eq!(md["line_number"], json!(15));
    }

    #[test]
    fn test_other_languages_and_broken_python_are_empty() {
        assert_eq!(
            extract_relations("import x from 'y'", "a.js", "javascript"),
            FileRelations::default()
        );
        assert_eq!(
            extract_relations("import os\ndef f(:\n", "a.py", "python").usages,
            Vec::new()
        );
    }

    #[test]
    fn test_local_definition_shadows_import() {
        let src = "from util import helper\n\ndef helper():\n    pass\n\nhelper()\n";
        let rel = extract_relations(src, "a.py", "python");
        assert!(rel.usages.is_empty());
    }

    #[test]
    fn test_relationship_map_queries() {
        let mut map = RelationshipMap::new();
        map.add_file(
            "pkg/store.py",
            &extract_relations("def open_store():\n    pass\n", "pkg/store.py", "python"),
        );
        map.add_file(
            "app.py",
            &extract_relations(
                "from pkg.store import open_store\n\nopen_store()\n",
                "app.py",
                "python",
            ),
        );
        map.add_file(
            "cli.py",
            &extract_relations("import store\n", "cli.py", "python"),
        );

        assert_eq!(map.dependencies("app.py"), vec!["pkg.store"]);
        assert_eq!(map.dependents("pkg/store.py"), vec!["app.py", "cli.py"]);
        assert_eq!(map.component_usage("open_store"), vec!["app.py"]);
        assert_eq!(map.defined_in("open_store"), vec!["pkg/store.py"]);
        assert_eq!(
            map.most_imported(5),
            vec![("pkg.store".to_string(), 1), ("store".to_string(), 1)]
        );

        map.add_file("app.py", &FileRelations::default());
        assert!(map.component_usage("open_store").is_empty());
        assert_eq!(map.dependents("pkg/store.py"), vec!["cli.py"]);
    }

    #[test]
    fn test_module_path() {
        assert_eq!(module_path("pkg/tools.py"), "pkg.tools");
        assert_eq!(module_path("./pkg/__init__.py"), "pkg");
        assert!(module_matches(".tools", "pkg.tools"));
        assert!(!module_matches("tool", "pkg.tools"));
    }
}
