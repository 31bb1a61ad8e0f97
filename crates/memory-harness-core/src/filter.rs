//! Payload filters.
//!
//! Two layers live here:
//!
//! - The **native filter** ([`Filter`], [`Clause`], [`FieldCondition`]) is
//!   what vector stores consume. It serializes to the same JSON shape the
//!   Qdrant REST API accepts, and [`Filter::matches`] evaluates it against
//!   a payload for stores that filter in-process.
//! - The **declarative builder** ([`FilterBuilder`]) turns a set of
//!   [`FilterableField`] declarations plus caller-supplied values into a
//!   native filter, validating field types and conditions.
//!
//! # Condition matrix
//!
//! | Field type | Conditions |
//! |------------|------------|
//! | keyword | `==` `!=` `any` `except` |
//! | integer | `==` `!=` `>` `>=` `<` `<=` `any` `except` |
//! | float | `>` `>=` `<` `<=` |
//! | boolean | `==` `!=` |
//!
//! A field with no condition is indexed but never produces a clause.
//! `!=` lands in `must_not`; everything else lands in `must`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Metadata, METADATA_KEY};
use crate::store::PayloadSchemaType;

// ═══════════════════════════════════════════════════════════════════════
// Native filter
// ═══════════════════════════════════════════════════════════════════════

/// Boolean combination of clauses: all of `must`, none of `must_not`, and
/// at least one of `should` when `should` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Clause>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Clause>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRef {
    pub key: String,
}

/// One filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Clause {
    IsNull { is_null: KeyRef },
    IsEmpty { is_empty: KeyRef },
    Field(FieldCondition),
    Nested(Box<Filter>),
}

/// Match and/or range condition on a payload key (dotted path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Match>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Match {
    Value {
        value: MatchValue,
    },
    Text {
        text: String,
    },
    Any {
        any: Vec<MatchValue>,
    },
    Except {
        #[serde(rename = "except")]
        except: Vec<MatchValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    Bool(bool),
    Integer(i64),
    Keyword(String),
}

impl MatchValue {
    fn equals(&self, value: &Value) -> bool {
        match (self, value) {
            (MatchValue::Bool(a), Value::Bool(b)) => a == b,
            (MatchValue::Integer(a), Value::Number(n)) => {
                n.as_i64() == Some(*a) || n.as_f64() == Some(*a as f64)
            }
            (MatchValue::Keyword(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for MatchValue {
    fn from(s: &str) -> Self {
        MatchValue::Keyword(s.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(s: String) -> Self {
        MatchValue::Keyword(s)
    }
}

impl From<i64> for MatchValue {
    fn from(i: i64) -> Self {
        MatchValue::Integer(i)
    }
}

impl From<bool> for MatchValue {
    fn from(b: bool) -> Self {
        MatchValue::Bool(b)
    }
}

/// Numeric bounds; every present bound must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl Range {
    fn contains(&self, x: f64) -> bool {
        self.gt.map_or(true, |b| x > b)
            && self.gte.map_or(true, |b| x >= b)
            && self.lt.map_or(true, |b| x < b)
            && self.lte.map_or(true, |b| x <= b)
    }
}

impl FieldCondition {
    pub fn value(key: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        Self {
            key: key.into(),
            matches: Some(Match::Value {
                value: value.into(),
            }),
            range: None,
        }
    }

    /// Full-text match: the stored string contains `text`.
    pub fn text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            matches: Some(Match::Text { text: text.into() }),
            range: None,
        }
    }

    pub fn any(key: impl Into<String>, values: Vec<MatchValue>) -> Self {
        Self {
            key: key.into(),
            matches: Some(Match::Any { any: values }),
            range: None,
        }
    }

    pub fn except(key: impl Into<String>, values: Vec<MatchValue>) -> Self {
        Self {
            key: key.into(),
            matches: Some(Match::Except { except: values }),
            range: None,
        }
    }

    pub fn range(key: impl Into<String>, range: Range) -> Self {
        Self {
            key: key.into(),
            matches: None,
            range: Some(range),
        }
    }

    fn matches(&self, payload: &Metadata) -> bool {
        let values = flatten(lookup(payload, &self.key));
        let match_ok = match &self.matches {
            None => true,
            Some(Match::Value { value }) => values.iter().any(|v| value.equals(v)),
            Some(Match::Text { text }) => values
                .iter()
                .any(|v| v.as_str().is_some_and(|s| s.contains(text.as_str()))),
            Some(Match::Any { any }) => values.iter().any(|v| any.iter().any(|m| m.equals(v))),
            Some(Match::Except { except }) => {
                !values.is_empty() && values.iter().all(|v| !except.iter().any(|m| m.equals(v)))
            }
        };
        let range_ok = match &self.range {
            None => true,
            Some(range) => values
                .iter()
                .filter_map(|v| v.as_f64())
                .any(|x| range.contains(x)),
        };
        match_ok && range_ok
    }
}

impl From<FieldCondition> for Clause {
    fn from(c: FieldCondition) -> Self {
        Clause::Field(c)
    }
}

impl Clause {
    pub fn is_null(key: impl Into<String>) -> Self {
        Clause::IsNull {
            is_null: KeyRef { key: key.into() },
        }
    }

    pub fn is_empty(key: impl Into<String>) -> Self {
        Clause::IsEmpty {
            is_empty: KeyRef { key: key.into() },
        }
    }

    pub fn matches(&self, payload: &Metadata) -> bool {
        match self {
            Clause::Field(c) => c.matches(payload),
            Clause::IsNull { is_null } => {
                let found = lookup(payload, &is_null.key);
                !found.is_empty() && found.iter().all(|v| v.is_null())
            }
            Clause::IsEmpty { is_empty } => flatten(lookup(payload, &is_empty.key))
                .iter()
                .all(|v| v.is_null()),
            Clause::Nested(f) => f.matches(payload),
        }
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(clauses: impl IntoIterator<Item = Clause>) -> Self {
        Self {
            must: clauses.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn should(clauses: impl IntoIterator<Item = Clause>) -> Self {
        Self {
            should: clauses.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_must(mut self, clause: impl Into<Clause>) -> Self {
        self.must.push(clause.into());
        self
    }

    pub fn with_must_not(mut self, clause: impl Into<Clause>) -> Self {
        self.must_not.push(clause.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// AND two filters. When both carry `should` groups, each group is
    /// nested under `must` so neither loosens the other.
    pub fn merge(mut self, other: Filter) -> Filter {
        self.must.extend(other.must);
        self.must_not.extend(other.must_not);
        match (self.should.is_empty(), other.should.is_empty()) {
            (_, true) => {}
            (true, false) => self.should = other.should,
            (false, false) => {
                let mine = std::mem::take(&mut self.should);
                self.must.push(Clause::Nested(Box::new(Filter::should(mine))));
                self.must
                    .push(Clause::Nested(Box::new(Filter::should(other.should))));
            }
        }
        self
    }

    /// Evaluate against a point payload.
    pub fn matches(&self, payload: &Metadata) -> bool {
        self.must.iter().all(|c| c.matches(payload))
            && !self.must_not.iter().any(|c| c.matches(payload))
            && (self.should.is_empty() || self.should.iter().any(|c| c.matches(payload)))
    }
}

/// Merge two optional filters with AND.
pub fn merge_filters(a: Option<Filter>, b: Option<Filter>) -> Option<Filter> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.merge(b)),
        (a, b) => a.or(b),
    }
}

/// Values at a dotted path. Arrays along the way fan out.
fn lookup<'a>(payload: &'a Metadata, key: &str) -> Vec<&'a Value> {
    let mut parts = key.split('.');
    let Some(first) = parts.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = payload.get(first).into_iter().collect();
    for part in parts {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Object(map) => map.get(part).into_iter().collect::<Vec<_>>(),
                Value::Array(items) => items
                    .iter()
                    .filter_map(|i| i.as_object().and_then(|m| m.get(part)))
                    .collect(),
                _ => Vec::new(),
            })
            .collect();
    }
    current
}

fn flatten(values: Vec<&Value>) -> Vec<&Value> {
    values
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Declarative builder
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Integer,
    Float,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldType::Keyword => "keyword",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
        })
    }
}

impl FieldType {
    pub fn schema_type(&self) -> PayloadSchemaType {
        match self {
            FieldType::Keyword => PayloadSchemaType::Keyword,
            FieldType::Integer => PayloadSchemaType::Integer,
            FieldType::Float => PayloadSchemaType::Float,
            FieldType::Boolean => PayloadSchemaType::Bool,
        }
    }

    pub fn supports(&self, condition: Condition) -> bool {
        use Condition::*;
        match self {
            FieldType::Keyword => matches!(condition, Eq | Ne | Any | Except),
            FieldType::Integer => true,
            FieldType::Float => matches!(condition, Gt | Gte | Lt | Lte),
            FieldType::Boolean => matches!(condition, Eq | Ne),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "except")]
    Except,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Condition::Eq => "==",
            Condition::Ne => "!=",
            Condition::Gt => ">",
            Condition::Gte => ">=",
            Condition::Lt => "<",
            Condition::Lte => "<=",
            Condition::Any => "any",
            Condition::Except => "except",
        })
    }
}

/// A metadata field callers may filter on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterableField {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub field_type: FieldType,
    /// `None`: indexed, but supplied values add no clause.
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub required: bool,
}

impl FilterableField {
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        condition: Option<Condition>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            field_type,
            condition,
            required: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Payload key of this field.
    pub fn key(&self) -> String {
        format!("{}.{}", METADATA_KEY, self.name)
    }
}

/// Fields filterable out of the box.
pub fn default_filterable_fields() -> Vec<FilterableField> {
    vec![
        FilterableField::new("category", FieldType::Keyword, Some(Condition::Eq))
            .describe("Memory category"),
        FilterableField::new("type", FieldType::Keyword, Some(Condition::Eq))
            .describe("Entry type"),
        FilterableField::new("workspace", FieldType::Keyword, Some(Condition::Eq))
            .describe("Workspace of indexed code"),
        FilterableField::new("language", FieldType::Keyword, Some(Condition::Eq))
            .describe("Programming language"),
        FilterableField::new("timestamp", FieldType::Float, Some(Condition::Gte))
            .describe("Created at or after (unix seconds)"),
    ]
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("field '{0}' is not a filterable field")]
    InvalidField(String),
    #[error("field '{0}' is required")]
    MissingRequiredField(String),
    #[error("invalid condition {condition} for {field_type} field '{field}'")]
    UnsupportedCondition {
        field: String,
        field_type: FieldType,
        condition: Condition,
    },
    #[error("invalid value for field '{field}': expected {expected}")]
    InvalidValue { field: String, expected: &'static str },
}

/// Builds native filters from declared fields and supplied values.
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    fields: BTreeMap<String, FilterableField>,
}

impl FilterBuilder {
    /// Validates every field's (type, condition) pair up front.
    pub fn new(fields: impl IntoIterator<Item = FilterableField>) -> Result<Self, FilterError> {
        let mut map = BTreeMap::new();
        for field in fields {
            if let Some(condition) = field.condition {
                if !field.field_type.supports(condition) {
                    return Err(FilterError::UnsupportedCondition {
                        field: field.name.clone(),
                        field_type: field.field_type,
                        condition,
                    });
                }
            }
            map.insert(field.name.clone(), field);
        }
        Ok(Self { fields: map })
    }

    pub fn fields(&self) -> impl Iterator<Item = &FilterableField> {
        self.fields.values()
    }

    /// Build a conjunctive filter from `values` (field name → value).
    /// `Value::Null` means "not supplied".
    pub fn build(&self, values: &BTreeMap<String, Value>) -> Result<Filter, FilterError> {
        let mut filter = Filter::new();
        for (name, value) in values {
            let field = self
                .fields
                .get(name)
                .ok_or_else(|| FilterError::InvalidField(name.clone()))?;

            if value.is_null() {
                if field.required {
                    return Err(FilterError::MissingRequiredField(name.clone()));
                }
                continue;
            }
            let Some(condition) = field.condition else {
                continue;
            };
            if !field.field_type.supports(condition) {
                return Err(FilterError::UnsupportedCondition {
                    field: name.clone(),
                    field_type: field.field_type,
                    condition,
                });
            }

            let key = field.key();
            let clause: Clause = match condition {
                Condition::Eq | Condition::Ne => {
                    FieldCondition::value(key, scalar(field, value)?).into()
                }
                Condition::Any => FieldCondition::any(key, list(field, value)?).into(),
                Condition::Except => FieldCondition::except(key, list(field, value)?).into(),
                Condition::Gt | Condition::Gte | Condition::Lt | Condition::Lte => {
                    let x = number(field, value)?;
                    let range = match condition {
                        Condition::Gt => Range { gt: Some(x), ..Default::default() },
                        Condition::Gte => Range { gte: Some(x), ..Default::default() },
                        Condition::Lt => Range { lt: Some(x), ..Default::default() },
                        _ => Range { lte: Some(x), ..Default::default() },
                    };
                    FieldCondition::range(key, range).into()
                }
            };
            if condition == Condition::Ne {
                filter.must_not.push(clause);
            } else {
                filter.must.push(clause);
            }
        }
        Ok(filter)
    }

    /// Payload indexes to create for the declared fields.
    pub fn build_indexes(&self) -> BTreeMap<String, PayloadSchemaType> {
        self.fields
            .values()
            .map(|f| (f.key(), f.field_type.schema_type()))
            .collect()
    }
}

fn invalid(field: &FilterableField, expected: &'static str) -> FilterError {
    FilterError::InvalidValue {
        field: field.name.clone(),
        expected,
    }
}

fn scalar(field: &FilterableField, value: &Value) -> Result<MatchValue, FilterError> {
    match field.field_type {
        FieldType::Keyword => value
            .as_str()
            .map(MatchValue::from)
            .ok_or_else(|| invalid(field, "a string")),
        FieldType::Integer => value
            .as_i64()
            .map(MatchValue::Integer)
            .ok_or_else(|| invalid(field, "an integer")),
        FieldType::Boolean => value
            .as_bool()
            .map(MatchValue::Bool)
            .ok_or_else(|| invalid(field, "a boolean")),
        FieldType::Float => Err(invalid(field, "a range bound")),
    }
}

fn list(field: &FilterableField, value: &Value) -> Result<Vec<MatchValue>, FilterError> {
    let expected = match field.field_type {
        FieldType::Integer => "a list of integers",
        _ => "a list of strings",
    };
    value
        .as_array()
        .ok_or_else(|| invalid(field, expected))?
        .iter()
        .map(|v| scalar(field, v).map_err(|_| invalid(field, expected)))
        .collect()
}

fn number(field: &FilterableField, value: &Value) -> Result<f64, FilterError> {
    match field.field_type {
        FieldType::Integer => value
            .as_i64()
            .map(|i| i as f64)
            .ok_or_else(|| invalid(field, "an integer")),
        _ => value.as_f64().ok_or_else(|| invalid(field, "a number")),
    }
}

/// Typed search filters over the default fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub entry_type: Option<String>,
    pub workspace: Option<String>,
    pub language: Option<String>,
    /// Created at or after (unix seconds).
    pub since: Option<f64>,
}

impl SearchFilters {
    pub fn into_values(self) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        let mut put = |name: &str, v: Option<Value>| {
            if let Some(v) = v {
                values.insert(name.to_string(), v);
            }
        };
        put("category", self.category.map(Value::String));
        put("type", self.entry_type.map(Value::String));
        put("workspace", self.workspace.map(Value::String));
        put("language", self.language.map(Value::String));
        put("timestamp", self.since.map(|s| serde_json::json!(s)));
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(md: Value) -> Metadata {
        let mut p = Metadata::new();
        p.insert("document".into(), json!("doc"));
        p.insert("metadata".into(), md);
        p
    }

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_condition_matrix() {
        use Condition::*;
        let all = [Eq, Ne, Gt, Gte, Lt, Lte, Any, Except];
        let allowed = |t: FieldType| all.iter().filter(|c| t.supports(**c)).count();
        assert_eq!(allowed(FieldType::Keyword), 4);
        assert_eq!(allowed(FieldType::Integer), 8);
        assert_eq!(allowed(FieldType::Float), 4);
        assert_eq!(allowed(FieldType::Boolean), 2);
        assert!(!FieldType::Float.supports(Eq));
        assert!(!FieldType::Boolean.supports(Any));
        assert!(!FieldType::Keyword.supports(Gt));
    }

    #[test]
    fn test_builder_rejects_bad_declaration() {
        let err = FilterBuilder::new(vec![FilterableField::new(
            "score",
            FieldType::Float,
            Some(Condition::Eq),
        )])
        .unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedCondition { .. }));
    }

    #[test]
    fn test_build_default_fields() {
        let builder = FilterBuilder::new(default_filterable_fields()).unwrap();
        let filter = builder
            .build(&values(&[
                ("category", json!("decision")),
                ("timestamp", json!(100.0)),
                ("language", Value::Null),
            ]))
            .unwrap();
        assert_eq!(filter.must.len(), 2);
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({"must": [
                {"key": "metadata.category", "match": {"value": "decision"}},
                {"key": "metadata.timestamp", "range": {"gte": 100.0}}
            ]})
        );
    }

    #[test]
    fn test_not_equal_goes_to_must_not() {
        let builder = FilterBuilder::new(vec![FilterableField::new(
            "archived",
            FieldType::Boolean,
            Some(Condition::Ne),
        )])
        .unwrap();
        let filter = builder.build(&values(&[("archived", json!(true))])).unwrap();
        assert!(filter.must.is_empty());
        assert_eq!(filter.must_not.len(), 1);
    }

    #[test]
    fn test_unknown_field_and_required() {
        let builder = FilterBuilder::new(vec![FilterableField::new(
            "project",
            FieldType::Keyword,
            Some(Condition::Eq),
        )
        .required()])
        .unwrap();
        assert_eq!(
            builder.build(&values(&[("nope", json!("x"))])).unwrap_err(),
            FilterError::InvalidField("nope".into())
        );
        assert_eq!(
            builder.build(&values(&[("project", Value::Null)])).unwrap_err(),
            FilterError::MissingRequiredField("project".into())
        );
    }

    #[test]
    fn test_invalid_value_types() {
        let builder = FilterBuilder::new(vec![
            FilterableField::new("count", FieldType::Integer, Some(Condition::Any)),
            FilterableField::new("tag", FieldType::Keyword, Some(Condition::Eq)),
        ])
        .unwrap();
        assert!(matches!(
            builder.build(&values(&[("count", json!(["a"]))])),
            Err(FilterError::InvalidValue { .. })
        ));
        assert!(matches!(
            builder.build(&values(&[("tag", json!(3))])),
            Err(FilterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_no_condition_yields_no_clause() {
        let builder = FilterBuilder::new(vec![FilterableField::new(
            "owner",
            FieldType::Keyword,
            None,
        )])
        .unwrap();
        let filter = builder.build(&values(&[("owner", json!("me"))])).unwrap();
        assert!(filter.is_empty());
        assert_eq!(
            builder.build_indexes().get("metadata.owner"),
            Some(&PayloadSchemaType::Keyword)
        );
    }

    #[test]
    fn test_build_indexes() {
        let builder = FilterBuilder::new(default_filterable_fields()).unwrap();
        let indexes = builder.build_indexes();
        assert_eq!(indexes.len(), 5);
        assert_eq!(indexes["metadata.timestamp"], PayloadSchemaType::Float);
        assert_eq!(indexes["metadata.category"], PayloadSchemaType::Keyword);
    }

    #[test]
    fn test_filter_evaluation() {
        let p = payload(json!({
            "category": "decision",
            "tags": "db, storage",
            "tag_list": ["db", "storage"],
            "timestamp": 50.0,
            "count": 3,
            "gone": null
        }));
        let yes = |f: Filter| assert!(f.matches(&p), "{:?}", f);
        let no = |f: Filter| assert!(!f.matches(&p), "{:?}", f);

        yes(Filter::new().with_must(FieldCondition::value("metadata.category", "decision")));
        no(Filter::new().with_must(FieldCondition::value("metadata.category", "pattern")));
        yes(Filter::new().with_must(FieldCondition::text("metadata.tags", "storage")));
        yes(Filter::new().with_must(FieldCondition::any(
            "metadata.tag_list",
            vec!["x".into(), "db".into()],
        )));
        no(Filter::new().with_must(FieldCondition::except(
            "metadata.category",
            vec!["decision".into()],
        )));
        yes(Filter::new().with_must(FieldCondition::range(
            "metadata.timestamp",
            Range { gte: Some(50.0), lt: Some(51.0), ..Default::default() },
        )));
        yes(Filter::new().with_must(FieldCondition::value("metadata.count", 3i64)));
        yes(Filter::new().with_must(Clause::is_null("metadata.gone")));
        yes(Filter::new().with_must(Clause::is_empty("metadata.missing")));
        no(Filter::new().with_must(Clause::is_empty("metadata.tag_list")));
        no(Filter::new().with_must_not(FieldCondition::value("metadata.category", "decision")));
        yes(Filter::should([
            FieldCondition::value("metadata.category", "pattern").into(),
            FieldCondition::value("metadata.category", "decision").into(),
        ]));
    }

    #[test]
    fn test_merge_nests_should_groups() {
        let a = Filter::should([FieldCondition::value("metadata.a", "1").into()]);
        let b = Filter::should([FieldCondition::value("metadata.b", "2").into()])
            .with_must(FieldCondition::value("metadata.c", "3"));
        let merged = a.merge(b);
        assert!(merged.should.is_empty());
        assert_eq!(merged.must.len(), 3);

        let p = payload(json!({"a": "1", "b": "2", "c": "3"}));
        assert!(merged.matches(&p));
        let p = payload(json!({"a": "1", "b": "x", "c": "3"}));
        assert!(!merged.matches(&p));
    }

    #[test]
    fn test_filter_json_roundtrip() {
        let raw = json!({
            "must": [
                {"key": "metadata.category", "match": {"any": ["decision", "pattern"]}},
                {"is_empty": {"key": "metadata.workspace"}},
                {"should": [{"key": "metadata.x", "match": {"value": true}}]}
            ],
            "must_not": [{"key": "metadata.n", "range": {"lt": 2.0}}]
        });
        let filter: Filter = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(filter.must[1], Clause::IsEmpty { .. }));
        assert!(matches!(filter.must[2], Clause::Nested(_)));
        assert_eq!(serde_json::to_value(&filter).unwrap(), raw);
    }

    #[test]
    fn test_search_filters_values() {
        let v = SearchFilters {
            category: Some("codebase".into()),
            workspace: Some("ws".into()),
            ..Default::default()
        }
        .into_values();
        assert_eq!(v.len(), 2);
        let builder = FilterBuilder::new(default_filterable_fields()).unwrap();
        assert_eq!(builder.build(&v).unwrap().must.len(), 2);
    }
}
