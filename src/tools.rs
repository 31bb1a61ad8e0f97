//! Tool surface.
//!
//! Every memory operation is exposed as a [`Tool`]: a name, a one-line
//! description, a JSON Schema for its parameters, and an async `execute`
//! that returns text. The HTTP server and the MCP bridge both serve the
//! same [`ToolRegistry`].
//!
//! Parameters are checked against the schema by [`validate_params`]
//! before a tool runs; a schema violation is a caller error. Once a tool
//! runs, any failure is reported in-band as `"Error: …"` text by
//! [`run_tool`], so callers always get a string back.
//!
//! | Tool | Mutates |
//! |------|---------|
//! | `store` | yes |
//! | `search` | no |
//! | `index_codebase` | yes |
//! | `update_files` | yes |
//! | `index_status` | no |
//! | `list_workspaces` | no |
//! | `remember_decision` | yes |
//! | `remember_pattern` | yes |
//! | `find_similar_code` | no |
//! | `find_usage` | no |
//! | `index_file` | yes |
//! | `get_project_summary` | no |
//! | `get_component_list` | no |
//! | `search_by_time` | no |
//! | `search_patterns` | no |
//! | `get_smart_context` | no |
//! | `clear_workspace` | yes |
//! | `get_current_context` | no |
//! | `run_janitor` | yes |
//!
//! In read-only mode the mutating tools are not registered at all.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::service::{
    DecisionRequest, MemoryService, PatternRequest, PatternSearchRequest, SearchRequest,
    SmartContextRequest, StoreRequest, TimeSearchRequest,
};

/// Handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    service: Arc<MemoryService>,
}

impl ToolContext {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &MemoryService {
        &self.service
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`) and MCP tool name.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether the tool writes to the store. Hidden in read-only mode.
    fn mutates(&self) -> bool {
        false
    }

    /// JSON Schema object with `properties` and optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Run with parameters already validated against the schema.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String>;
}

/// Serializable summary for `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub read_only: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            read_only: !tool.mutates(),
            parameters: tool.parameters_schema(),
        }
    }
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// All memory tools; mutating ones are left out when `read_only`.
    pub fn with_memory_tools(read_only: bool) -> Self {
        let all: Vec<Box<dyn Tool>> = vec![
            Box::new(StoreTool),
            Box::new(SearchTool),
            Box::new(IndexCodebaseTool),
            Box::new(UpdateFilesTool),
            Box::new(IndexStatusTool),
            Box::new(ListWorkspacesTool),
            Box::new(RememberDecisionTool),
            Box::new(RememberPatternTool),
            Box::new(FindSimilarCodeTool),
            Box::new(FindUsageTool),
            Box::new(IndexFileTool),
            Box::new(ProjectSummaryTool),
            Box::new(ComponentListTool),
            Box::new(SearchByTimeTool),
            Box::new(SearchPatternsTool),
            Box::new(SmartContextTool),
            Box::new(ClearWorkspaceTool),
            Box::new(CurrentContextTool),
            Box::new(JanitorTool),
        ];
        let mut registry = Self::new();
        for tool in all {
            if read_only && tool.mutates() {
                debug!(tool = tool.name(), "read-only mode: tool hidden");
                continue;
            }
            registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| ToolInfo::from_tool(t.as_ref())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate `params`, then execute. Schema violations are `Err`;
/// execution failures come back as `Ok("Error: …")`.
pub async fn run_tool(tool: &dyn Tool, params: Value, ctx: &ToolContext) -> Result<String> {
    let params = validate_params(&tool.parameters_schema(), &params)?;
    match tool.execute(params, ctx).await {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!(tool = tool.name(), error = %e, "tool failed");
            Ok(format!("Error: {}", e))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter Validation
// ═══════════════════════════════════════════════════════════════════════

/// Check required fields, types and enums; inject schema defaults for
/// missing optional fields. `null` counts as absent.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let mut result = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be an object, got {}", json_type_name(other)),
    };
    result.retain(|_, v| !v.is_null());

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    for field in required {
        if !result.contains_key(field) {
            bail!("missing required parameter: {}", field);
        }
    }

    for (name, prop) in &properties {
        let Some(value) = result.get(name) else {
            if let Some(default) = prop.get("default") {
                result.insert(name.clone(), default.clone());
            }
            continue;
        };

        if let Some(types) = prop.get("type") {
            let allowed: Vec<&str> = match types {
                Value::String(t) => vec![t.as_str()],
                Value::Array(ts) => ts.iter().filter_map(|t| t.as_str()).collect(),
                _ => Vec::new(),
            };
            if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    name,
                    allowed.join("|"),
                    json_type_name(value)
                );
            }
        }

        if let Some(options) = prop.get("enum").and_then(|e| e.as_array()) {
            if !options.contains(value) {
                let allowed: Vec<String> = options.iter().map(|v| v.to_string()).collect();
                bail!(
                    "parameter '{}' must be one of [{}], got {}",
                    name,
                    allowed.join(", "),
                    value
                );
            }
        }
    }

    Ok(Value::Object(result))
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T> {
    Ok(serde_json::from_value(params)?)
}

fn str_param<'a>(params: &'a Value, name: &str) -> &'a str {
    params.get(name).and_then(Value::as_str).unwrap_or("")
}

/// `{path: content}` object → ordered `(path, content)` pairs.
fn files_param(params: &Value) -> Result<Vec<(String, String)>> {
    let Some(map) = params.get("files").and_then(Value::as_object) else {
        bail!("files must be an object of {{path: content}}");
    };
    map.iter()
        .map(|(path, content)| match content.as_str() {
            Some(c) => Ok((path.clone(), c.to_string())),
            None => bail!("content for '{}' must be a string", path),
        })
        .collect()
}

const CATEGORIES: [&str; 8] = [
    "decision",
    "pattern",
    "memory",
    "codebase",
    "architecture",
    "error",
    "lesson",
    "other",
];

// ═══════════════════════════════════════════════════════════════════════
// Tools
// ═══════════════════════════════════════════════════════════════════════

pub struct StoreTool;

#[async_trait]
impl Tool for StoreTool {
    fn name(&self) -> &str {
        "store"
    }

    fn description(&self) -> &str {
        "Store a decision, pattern or general memory with optional tags, language and project"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "information": { "type": "string", "description": "Text to store" },
                "category": { "type": "string", "enum": CATEGORIES, "description": "Defaults to memory" },
                "tags": { "type": "string", "description": "Comma-separated tags" },
                "language": { "type": "string" },
                "project": { "type": "string" },
                "metadata": { "type": ["object", "string"], "description": "Extra metadata, an object or a JSON string" }
            },
            "required": ["information"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service().store(parse::<StoreRequest>(params)?).await
    }
}

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Semantic search across code, decisions, patterns and memories, grouped by category"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "workspace_name": { "type": "string", "description": "Limit code results to this workspace" },
                "category": { "type": "string", "enum": CATEGORIES },
                "language": { "type": "string" },
                "tags": { "type": "string", "description": "Comma-separated; every tag must match" },
                "since": { "type": "string", "description": "ISO timestamp lower bound" },
                "until": { "type": "string", "description": "ISO timestamp upper bound" },
                "filter": { "type": "object", "description": "Native filter {must, should, must_not}" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service().search(parse::<SearchRequest>(params)?).await
    }
}

pub struct IndexCodebaseTool;

#[async_trait]
impl Tool for IndexCodebaseTool {
    fn name(&self) -> &str {
        "index_codebase"
    }

    fn description(&self) -> &str {
        "Index a whole codebase sent as {path: content}; unchanged files are skipped"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "files": { "type": "object", "description": "Map of file path to file content" },
                "workspace_name": { "type": "string", "description": "Root directory name of the workspace" }
            },
            "required": ["files", "workspace_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let files = files_param(&params)?;
        ctx.service()
            .index_codebase(files, str_param(&params, "workspace_name"))
            .await
    }
}

pub struct UpdateFilesTool;

#[async_trait]
impl Tool for UpdateFilesTool {
    fn name(&self) -> &str {
        "update_files"
    }

    fn description(&self) -> &str {
        "Re-index only the files whose content changed"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        IndexCodebaseTool.parameters_schema()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let files = files_param(&params)?;
        ctx.service()
            .update_files(files, str_param(&params, "workspace_name"))
            .await
    }
}

fn workspace_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "workspace_name": { "type": "string", "description": "Root directory name of the workspace" }
        },
        "required": ["workspace_name"]
    })
}

pub struct IndexStatusTool;

#[async_trait]
impl Tool for IndexStatusTool {
    fn name(&self) -> &str {
        "index_status"
    }

    fn description(&self) -> &str {
        "Files tracked, last update and index health for a workspace"
    }

    fn parameters_schema(&self) -> Value {
        workspace_schema()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .index_status(str_param(&params, "workspace_name"))
            .await
    }
}

pub struct ListWorkspacesTool;

#[async_trait]
impl Tool for ListWorkspacesTool {
    fn name(&self) -> &str {
        "list_workspaces"
    }

    fn description(&self) -> &str {
        "List indexed workspaces with file and chunk counts"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service().list_workspaces().await
    }
}

pub struct RememberDecisionTool;

#[async_trait]
impl Tool for RememberDecisionTool {
    fn name(&self) -> &str {
        "remember_decision"
    }

    fn description(&self) -> &str {
        "Record an architectural decision with rationale and alternatives"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "decision": { "type": "string" },
                "rationale": { "type": "string" },
                "alternatives": { "type": "string" },
                "tags": { "type": "string" },
                "project": { "type": "string" }
            },
            "required": ["decision"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .remember_decision(parse::<DecisionRequest>(params)?)
            .await
    }
}

pub struct RememberPatternTool;

#[async_trait]
impl Tool for RememberPatternTool {
    fn name(&self) -> &str {
        "remember_pattern"
    }

    fn description(&self) -> &str {
        "Record a coding pattern with an example and when to use it"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "example": { "type": "string" },
                "use_case": { "type": "string" },
                "tags": { "type": "string" },
                "language": { "type": "string" },
                "project": { "type": "string" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .remember_pattern(parse::<PatternRequest>(params)?)
            .await
    }
}

pub struct FindSimilarCodeTool;

#[async_trait]
impl Tool for FindSimilarCodeTool {
    fn name(&self) -> &str {
        "find_similar_code"
    }

    fn description(&self) -> &str {
        "Find indexed code in a workspace similar to a snippet"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code_snippet": { "type": "string" },
                "workspace_name": { "type": "string" }
            },
            "required": ["code_snippet", "workspace_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .find_similar_code(
                str_param(&params, "code_snippet"),
                str_param(&params, "workspace_name"),
            )
            .await
    }
}

pub struct FindUsageTool;

#[async_trait]
impl Tool for FindUsageTool {
    fn name(&self) -> &str {
        "find_usage"
    }

    fn description(&self) -> &str {
        "Find where an imported class or function is used in a workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "component_name": { "type": "string" },
                "workspace_name": { "type": "string" }
            },
            "required": ["component_name", "workspace_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .find_usage(
                str_param(&params, "component_name"),
                str_param(&params, "workspace_name"),
            )
            .await
    }
}

pub struct IndexFileTool;

#[async_trait]
impl Tool for IndexFileTool {
    fn name(&self) -> &str {
        "index_file"
    }

    fn description(&self) -> &str {
        "Index a single file and report its dependencies and dependents"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "content": { "type": "string" },
                "workspace_name": { "type": "string" }
            },
            "required": ["file_path", "content", "workspace_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .index_file(
                str_param(&params, "file_path"),
                str_param(&params, "content"),
                str_param(&params, "workspace_name"),
            )
            .await
    }
}

pub struct ProjectSummaryTool;

#[async_trait]
impl Tool for ProjectSummaryTool {
    fn name(&self) -> &str {
        "get_project_summary"
    }

    fn description(&self) -> &str {
        "Languages, entry points, key classes and most imported modules of a workspace"
    }

    fn parameters_schema(&self) -> Value {
        workspace_schema()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .get_project_summary(str_param(&params, "workspace_name"))
            .await
    }
}

pub struct ComponentListTool;

#[async_trait]
impl Tool for ComponentListTool {
    fn name(&self) -> &str {
        "get_component_list"
    }

    fn description(&self) -> &str {
        "List the classes, functions or files indexed in a workspace"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_name": { "type": "string" },
                "component_type": {
                    "type": "string",
                    "enum": ["classes", "functions", "files", "all"],
                    "default": "all"
                }
            },
            "required": ["workspace_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let component_type = params
            .get("component_type")
            .and_then(Value::as_str)
            .unwrap_or("all");
        ctx.service()
            .get_component_list(str_param(&params, "workspace_name"), component_type)
            .await
    }
}

pub struct SearchByTimeTool;

#[async_trait]
impl Tool for SearchByTimeTool {
    fn name(&self) -> &str {
        "search_by_time"
    }

    fn description(&self) -> &str {
        "Search entries created within a time window"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "since": { "type": "string", "description": "ISO timestamp lower bound" },
                "until": { "type": "string", "description": "ISO timestamp upper bound" },
                "category": { "type": "string", "enum": CATEGORIES },
                "workspace_name": { "type": "string" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .search_by_time(parse::<TimeSearchRequest>(params)?)
            .await
    }
}

pub struct SearchPatternsTool;

#[async_trait]
impl Tool for SearchPatternsTool {
    fn name(&self) -> &str {
        "search_patterns"
    }

    fn description(&self) -> &str {
        "Search stored patterns by language, tags and project"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "language": { "type": "string" },
                "tags": { "type": "string" },
                "project": { "type": "string" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .search_patterns(parse::<PatternSearchRequest>(params)?)
            .await
    }
}

pub struct SmartContextTool;

#[async_trait]
impl Tool for SmartContextTool {
    fn name(&self) -> &str {
        "get_smart_context"
    }

    fn description(&self) -> &str {
        "Related decisions, patterns and code for a topic in one call"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string" },
                "workspace_name": { "type": "string" },
                "max_results": { "type": "integer", "default": 15 },
                "include_code": { "type": "boolean", "default": true }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .get_smart_context(parse::<SmartContextRequest>(params)?)
            .await
    }
}

pub struct ClearWorkspaceTool;

#[async_trait]
impl Tool for ClearWorkspaceTool {
    fn name(&self) -> &str {
        "clear_workspace"
    }

    fn description(&self) -> &str {
        "Delete all indexed code of a workspace (requires confirm=true)"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_name": { "type": "string" },
                "confirm": { "type": "boolean", "default": false }
            },
            "required": ["workspace_name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let confirm = params
            .get("confirm")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        ctx.service()
            .clear_workspace(str_param(&params, "workspace_name"), confirm)
            .await
    }
}

pub struct CurrentContextTool;

#[async_trait]
impl Tool for CurrentContextTool {
    fn name(&self) -> &str {
        "get_current_context"
    }

    fn description(&self) -> &str {
        "Quick overview of a workspace's index"
    }

    fn parameters_schema(&self) -> Value {
        workspace_schema()
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service()
            .get_current_context(str_param(&params, "workspace_name"))
            .await
    }
}

pub struct JanitorTool;

#[async_trait]
impl Tool for JanitorTool {
    fn name(&self) -> &str {
        "run_janitor"
    }

    fn description(&self) -> &str {
        "Run a maintenance cycle: workspace and category hygiene, dedup, conflicts, staleness, health"
    }

    fn mutates(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<String> {
        ctx.service().run_janitor().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_missing_required() {
        let err = validate_params(&StoreTool.parameters_schema(), &json!({}))
            .unwrap_err()
            .to_string();
        assert_eq!(err, "missing required parameter: information");
    }

    #[test]
    fn test_validate_type_mismatch() {
        let err = validate_params(
            &SmartContextTool.parameters_schema(),
            &json!({ "topic": "auth", "max_results": "ten" }),
        )
        .unwrap_err()
        .to_string();
        assert_eq!(
            err,
            "parameter 'max_results' must be of type 'integer', got string"
        );
    }

    #[test]
    fn test_validate_union_type_and_defaults() {
        let schema = StoreTool.parameters_schema();
        assert!(validate_params(&schema, &json!({ "information": "x", "metadata": "{}" })).is_ok());
        assert!(validate_params(&schema, &json!({ "information": "x", "metadata": 3 })).is_err());

        let params =
            validate_params(&SmartContextTool.parameters_schema(), &json!({ "topic": "t" }))
                .unwrap();
        assert_eq!(params["max_results"], json!(15));
        assert_eq!(params["include_code"], json!(true));
    }

    #[test]
    fn test_validate_enum_and_null() {
        let schema = SearchTool.parameters_schema();
        let err = validate_params(&schema, &json!({ "query": "q", "category": "bogus" }))
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("parameter 'category' must be one of ["));

        let params = validate_params(&schema, &json!({ "query": "q", "category": null })).unwrap();
        assert!(params.get("category").is_none());
    }

    #[test]
    fn test_registry_read_only_hides_mutating_tools() {
        let full = ToolRegistry::with_memory_tools(false);
        assert_eq!(full.len(), 19);
        assert!(full.find("store").is_some());

        let ro = ToolRegistry::with_memory_tools(true);
        assert_eq!(ro.len(), 11);
        assert!(ro.find("store").is_none());
        assert!(ro.find("index_file").is_none());
        assert!(ro.find("find_usage").is_some());
        assert!(ro.find("clear_workspace").is_none());
        assert!(ro.find("search").is_some());
        assert!(ro.infos().iter().all(|i| i.read_only));
    }

    #[test]
    fn test_files_param_requires_string_contents() {
        let ok = files_param(&json!({ "files": { "a.py": "x = 1" } })).unwrap();
        assert_eq!(ok, vec![("a.py".to_string(), "x = 1".to_string())]);
        assert!(files_param(&json!({ "files": { "a.py": 1 } })).is_err());
    }
}
