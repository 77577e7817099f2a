//! Filter expressions and their compilation to SQL
//!
//! A filter is either a condition (`[field, value]` with an implicit `is`,
//! or `[field, operator, value]`) or a group
//! `{filter_operator: "all"|"any", filters: [...]}` nesting arbitrarily.
//! Dotted field paths compile to LEFT JOIN chains shared per path prefix;
//! conditions become parameterized WHERE fragments. Negated operators are
//! null-safe: a row whose intermediate relationship is null matches
//! `is_not`/`not_in` and fails `is`/`in`.

use std::collections::HashMap;

use serde_json::Value as Json;

use crate::core::error::{QueryError, QueryResult};
use crate::core::schema::{EntityKind, EntitySchema, FieldDef, FieldType};

/// Connector for a filter list or group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupOp {
    #[default]
    All,
    Any,
}

impl GroupOp {
    /// Parse the wire spelling; anything other than "all" combines with OR
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") {
            GroupOp::All
        } else {
            GroupOp::Any
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            GroupOp::All => "AND",
            GroupOp::Any => "OR",
        }
    }
}

/// Comparison operator of a single condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Is,
    IsNot,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
}

impl CompareOp {
    /// Parse an operator name, accepting the aliases the wire protocol has
    /// historically allowed
    pub fn parse(op: &str) -> QueryResult<Self> {
        match op.to_ascii_lowercase().as_str() {
            "is" | "equals" | "==" => Ok(CompareOp::Is),
            "is_not" | "!=" => Ok(CompareOp::IsNot),
            "in" => Ok(CompareOp::In),
            "not_in" => Ok(CompareOp::NotIn),
            "contains" | "name_contains" => Ok(CompareOp::Contains),
            "not_contains" => Ok(CompareOp::NotContains),
            "starts_with" | "startswith" => Ok(CompareOp::StartsWith),
            "ends_with" | "endswith" => Ok(CompareOp::EndsWith),
            "<" | "lt" => Ok(CompareOp::Lt),
            "<=" | "lte" => Ok(CompareOp::Lte),
            ">" | "gt" => Ok(CompareOp::Gt),
            ">=" | "gte" => Ok(CompareOp::Gte),
            "between" | "range" => Ok(CompareOp::Between),
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// One node of a filter expression tree
#[derive(Debug, Clone)]
pub enum Filter {
    Cond { field: String, op: CompareOp, value: Json },
    Group { op: GroupOp, filters: Vec<Filter> },
}

impl Filter {
    /// Equality condition (the implicit operator of 2-tuple filters)
    pub fn is(field: impl Into<String>, value: impl Into<Json>) -> Self {
        Filter::Cond { field: field.into(), op: CompareOp::Is, value: value.into() }
    }

    pub fn cond(field: impl Into<String>, op: CompareOp, value: impl Into<Json>) -> Self {
        Filter::Cond { field: field.into(), op, value: value.into() }
    }

    pub fn all(filters: Vec<Filter>) -> Self {
        Filter::Group { op: GroupOp::All, filters }
    }

    pub fn any(filters: Vec<Filter>) -> Self {
        Filter::Group { op: GroupOp::Any, filters }
    }

    /// Parse a single filter element from its JSON wire form
    pub fn parse(json: &Json) -> QueryResult<Filter> {
        match json {
            Json::Object(map) => {
                let op = match map.get("filter_operator") {
                    Some(Json::String(s)) => GroupOp::parse(s),
                    Some(other) => {
                        return Err(QueryError::InvalidFilter(format!(
                            "filter_operator must be a string, got {other}"
                        )));
                    }
                    None => GroupOp::All,
                };
                let filters = match map.get("filters") {
                    Some(Json::Array(items)) => {
                        items.iter().map(Filter::parse).collect::<QueryResult<Vec<_>>>()?
                    }
                    Some(other) => {
                        return Err(QueryError::InvalidFilter(format!(
                            "filters must be a list, got {other}"
                        )));
                    }
                    None => Vec::new(),
                };
                Ok(Filter::Group { op, filters })
            }
            Json::Array(items) => match items.as_slice() {
                [Json::String(field), value] => {
                    Ok(Filter::is(field.clone(), value.clone()))
                }
                [Json::String(field), Json::String(op), value] => {
                    Ok(Filter::cond(field.clone(), CompareOp::parse(op)?, value.clone()))
                }
                _ => Err(QueryError::InvalidFilter(format!(
                    "expected [field, value] or [field, operator, value], got {json}"
                ))),
            },
            other => Err(QueryError::InvalidFilter(format!("invalid filter element: {other}"))),
        }
    }

    /// Parse a filter list from its JSON wire form
    pub fn parse_list(json: &Json) -> QueryResult<Vec<Filter>> {
        match json {
            Json::Null => Ok(Vec::new()),
            Json::Array(items) => items.iter().map(Filter::parse).collect(),
            other => Err(QueryError::InvalidFilter(format!("filters must be a list, got {other}"))),
        }
    }
}

/// A resolved column reference for a (possibly dotted) field path
pub(crate) enum ColumnRef {
    /// Direct column on the root table or a joined table
    Direct { expr: String },
    /// Terminal to-many edge; conditions compile to EXISTS subqueries
    Many { owner_alias: String, field: &'static FieldDef },
}

/// Accumulates the LEFT JOINs a query needs, one per distinct path prefix
pub(crate) struct JoinBuilder {
    root: &'static EntitySchema,
    joins: Vec<String>,
    aliases: HashMap<String, (String, &'static EntitySchema)>,
    counter: usize,
}

impl JoinBuilder {
    pub fn new(kind: EntityKind) -> Self {
        Self { root: kind.schema(), joins: Vec::new(), aliases: HashMap::new(), counter: 0 }
    }

    /// The JOIN clauses accumulated so far, ready to splice after FROM
    pub fn joins_sql(&self) -> String {
        self.joins.concat()
    }

    /// Resolve `path` to a column reference, adding joins as needed.
    ///
    /// Mid-path segments must be to-one edges; a to-many edge is only
    /// valid as the terminal segment.
    pub fn column(&mut self, path: &str) -> QueryResult<ColumnRef> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut alias = "t0".to_string();
        let mut schema = self.root;
        let mut prefix = String::new();

        for (index, segment) in segments.iter().enumerate() {
            let last = index == segments.len() - 1;

            // `id` is not a declared field but is always addressable
            if last && *segment == "id" {
                return Ok(ColumnRef::Direct { expr: format!("{alias}.id") });
            }

            let field = schema.field(segment).ok_or_else(|| {
                QueryError::InvalidFilter(format!(
                    "unknown field '{}' on {} (in path '{}')",
                    segment, schema.kind, path
                ))
            })?;

            if last {
                return Ok(match field.ty {
                    FieldType::ToMany { .. } => ColumnRef::Many { owner_alias: alias, field },
                    _ => ColumnRef::Direct { expr: format!("{}.{}", alias, field.column) },
                });
            }

            let target = match field.ty {
                FieldType::ToOne(target) => target,
                FieldType::ToMany { .. } => {
                    return Err(QueryError::InvalidFilter(format!(
                        "cannot traverse to-many field '{}' mid-path in '{}'",
                        segment, path
                    )));
                }
                _ => {
                    return Err(QueryError::InvalidFilter(format!(
                        "'{}' is not a relationship (in path '{}')",
                        segment, path
                    )));
                }
            };

            prefix = if prefix.is_empty() {
                (*segment).to_string()
            } else {
                format!("{prefix}.{segment}")
            };

            if let Some((existing, target_schema)) = self.aliases.get(&prefix) {
                alias = existing.clone();
                schema = target_schema;
            } else {
                self.counter += 1;
                let next = format!("t{}", self.counter);
                let target_schema = target.schema();
                self.joins.push(format!(
                    " LEFT JOIN {} {} ON {}.{} = {}.id",
                    target_schema.table, next, alias, field.column, next
                ));
                self.aliases.insert(prefix.clone(), (next.clone(), target_schema));
                alias = next;
                schema = target_schema;
            }
        }

        // split('.') yields at least one segment
        Err(QueryError::InvalidFilter(format!("empty field path '{path}'")))
    }
}

/// Compile a filter list into a WHERE fragment, pushing parameters
pub(crate) fn compile(
    filters: &[Filter],
    op: GroupOp,
    joins: &mut JoinBuilder,
    params: &mut Vec<rusqlite::types::Value>,
) -> QueryResult<String> {
    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        match filter {
            Filter::Group { op: sub_op, filters: sub } => {
                let clause = compile(sub, *sub_op, joins, params)?;
                if !clause.is_empty() {
                    parts.push(format!("({clause})"));
                }
            }
            Filter::Cond { field, op: cmp, value } => {
                parts.push(condition(joins, params, field, *cmp, value)?);
            }
        }
    }
    Ok(parts.join(&format!(" {} ", op.sql())))
}

fn condition(
    joins: &mut JoinBuilder,
    params: &mut Vec<rusqlite::types::Value>,
    field: &str,
    op: CompareOp,
    value: &Json,
) -> QueryResult<String> {
    match joins.column(field)? {
        ColumnRef::Direct { expr, .. } => scalar_condition(params, &expr, op, value, field),
        ColumnRef::Many { owner_alias, field: def } => {
            many_condition(params, &owner_alias, def, op, value, field)
        }
    }
}

fn scalar_condition(
    params: &mut Vec<rusqlite::types::Value>,
    expr: &str,
    op: CompareOp,
    value: &Json,
    field: &str,
) -> QueryResult<String> {
    match op {
        CompareOp::Is => {
            if value.is_null() {
                Ok(format!("{expr} IS NULL"))
            } else {
                params.push(to_param(&normalize_ref(value), field)?);
                Ok(format!("{expr} = ?"))
            }
        }
        CompareOp::IsNot => {
            if value.is_null() {
                Ok(format!("{expr} IS NOT NULL"))
            } else {
                params.push(to_param(&normalize_ref(value), field)?);
                Ok(format!("({expr} IS NULL OR {expr} != ?)"))
            }
        }
        CompareOp::In => {
            let ids = value_list(value, field)?;
            if ids.is_empty() {
                return Ok("0 = 1".to_string());
            }
            let placeholders = push_all(params, ids);
            Ok(format!("{expr} IN ({placeholders})"))
        }
        CompareOp::NotIn => {
            let ids = value_list(value, field)?;
            if ids.is_empty() {
                return Ok("1 = 1".to_string());
            }
            let placeholders = push_all(params, ids);
            Ok(format!("({expr} IS NULL OR {expr} NOT IN ({placeholders}))"))
        }
        CompareOp::Contains => {
            params.push(like_param(value, field, "%", "%")?);
            Ok(format!("LOWER({expr}) LIKE LOWER(?) ESCAPE '\\'"))
        }
        CompareOp::NotContains => {
            params.push(like_param(value, field, "%", "%")?);
            Ok(format!("({expr} IS NULL OR LOWER({expr}) NOT LIKE LOWER(?) ESCAPE '\\')"))
        }
        CompareOp::StartsWith => {
            params.push(like_param(value, field, "", "%")?);
            Ok(format!("LOWER({expr}) LIKE LOWER(?) ESCAPE '\\'"))
        }
        CompareOp::EndsWith => {
            params.push(like_param(value, field, "%", "")?);
            Ok(format!("LOWER({expr}) LIKE LOWER(?) ESCAPE '\\'"))
        }
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            let sql_op = match op {
                CompareOp::Lt => "<",
                CompareOp::Lte => "<=",
                CompareOp::Gt => ">",
                _ => ">=",
            };
            params.push(to_param(value, field)?);
            Ok(format!("{expr} {sql_op} ?"))
        }
        CompareOp::Between => {
            let bounds = match value {
                Json::Array(items) if items.len() == 2 => items,
                other => {
                    return Err(QueryError::InvalidFilter(format!(
                        "'between' on '{field}' expects [start, end], got {other}"
                    )));
                }
            };
            params.push(to_param(&bounds[0], field)?);
            params.push(to_param(&bounds[1], field)?);
            Ok(format!("{expr} BETWEEN ? AND ?"))
        }
    }
}

fn many_condition(
    params: &mut Vec<rusqlite::types::Value>,
    owner_alias: &str,
    def: &'static FieldDef,
    op: CompareOp,
    value: &Json,
    field: &str,
) -> QueryResult<String> {
    let FieldType::ToMany { join_table, own_col, target_col, .. } = def.ty else {
        return Err(QueryError::InvalidFilter(format!("'{field}' is not a to-many field")));
    };
    let linked = format!(
        "SELECT 1 FROM {join_table} m WHERE m.{own_col} = {owner_alias}.id"
    );
    match op {
        CompareOp::Is => {
            if value.is_null() {
                Ok(format!("NOT EXISTS ({linked})"))
            } else {
                params.push(to_param(&normalize_ref(value), field)?);
                Ok(format!("EXISTS ({linked} AND m.{target_col} = ?)"))
            }
        }
        CompareOp::IsNot => {
            if value.is_null() {
                Ok(format!("EXISTS ({linked})"))
            } else {
                params.push(to_param(&normalize_ref(value), field)?);
                Ok(format!("NOT EXISTS ({linked} AND m.{target_col} = ?)"))
            }
        }
        CompareOp::In => {
            let ids = value_list(value, field)?;
            if ids.is_empty() {
                return Ok("0 = 1".to_string());
            }
            let placeholders = push_all(params, ids);
            Ok(format!("EXISTS ({linked} AND m.{target_col} IN ({placeholders}))"))
        }
        CompareOp::NotIn => {
            let ids = value_list(value, field)?;
            if ids.is_empty() {
                return Ok("1 = 1".to_string());
            }
            let placeholders = push_all(params, ids);
            Ok(format!("NOT EXISTS ({linked} AND m.{target_col} IN ({placeholders}))"))
        }
        _ => Err(QueryError::InvalidFilter(format!(
            "operator not supported for to-many field '{field}'"
        ))),
    }
}

/// Collapse a link dict `{id: ...}` to its bare id; leave scalars alone
fn normalize_ref(value: &Json) -> Json {
    match value {
        Json::Object(map) => map.get("id").cloned().unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

fn value_list(value: &Json, field: &str) -> QueryResult<Vec<rusqlite::types::Value>> {
    match value {
        Json::Array(items) => {
            items.iter().map(|v| to_param(&normalize_ref(v), field)).collect()
        }
        other => Err(QueryError::InvalidFilter(format!(
            "membership test on '{field}' expects a list, got {other}"
        ))),
    }
}

fn push_all(params: &mut Vec<rusqlite::types::Value>, values: Vec<rusqlite::types::Value>) -> String {
    let placeholders = vec!["?"; values.len()].join(", ");
    params.extend(values);
    placeholders
}

fn to_param(value: &Json, field: &str) -> QueryResult<rusqlite::types::Value> {
    match value {
        Json::Null => Ok(rusqlite::types::Value::Null),
        Json::Bool(b) => Ok(rusqlite::types::Value::Integer(*b as i64)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(rusqlite::types::Value::Integer(i))
            } else {
                Ok(rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0)))
            }
        }
        Json::String(s) => Ok(rusqlite::types::Value::Text(s.clone())),
        other => Err(QueryError::InvalidFilter(format!(
            "unsupported filter value for '{field}': {other}"
        ))),
    }
}

fn like_param(
    value: &Json,
    field: &str,
    before: &str,
    after: &str,
) -> QueryResult<rusqlite::types::Value> {
    let needle = value.as_str().ok_or_else(|| {
        QueryError::InvalidFilter(format!("substring match on '{field}' expects a string"))
    })?;
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Ok(rusqlite::types::Value::Text(format!("{before}{escaped}{after}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile_for(kind: EntityKind, filters: &[Filter]) -> (String, String, usize) {
        let mut joins = JoinBuilder::new(kind);
        let mut params = Vec::new();
        let clause = compile(filters, GroupOp::All, &mut joins, &mut params).unwrap();
        (clause, joins.joins_sql(), params.len())
    }

    #[test]
    fn test_parse_two_tuple_condition() {
        let filter = Filter::parse(&json!(["status", "ip"])).unwrap();
        match filter {
            Filter::Cond { field, op, value } => {
                assert_eq!(field, "status");
                assert_eq!(op, CompareOp::Is);
                assert_eq!(value, json!("ip"));
            }
            _ => panic!("expected a condition"),
        }
    }

    #[test]
    fn test_parse_three_tuple_condition() {
        let filter = Filter::parse(&json!(["week", ">=", "2024-01-08"])).unwrap();
        assert!(matches!(filter, Filter::Cond { op: CompareOp::Gte, .. }));
    }

    #[test]
    fn test_parse_nested_group() {
        let filter = Filter::parse(&json!({
            "filter_operator": "any",
            "filters": [["status", "ip"], ["status", "fin"]]
        }))
        .unwrap();
        match filter {
            Filter::Group { op, filters } => {
                assert_eq!(op, GroupOp::Any);
                assert_eq!(filters.len(), 2);
            }
            _ => panic!("expected a group"),
        }
    }

    #[test]
    fn test_parse_malformed_tuple_is_invalid() {
        let err = Filter::parse(&json!(["status"])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }

    #[test]
    fn test_parse_unknown_operator() {
        let err = Filter::parse(&json!(["status", "resembles", "ip"])).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator(_)));
    }

    #[test]
    fn test_dotted_path_emits_left_join_chain() {
        let filters = [Filter::is("asset.phase.subproject", json!(1))];
        let (clause, joins, params) = compile_for(EntityKind::Task, &filters);
        assert_eq!(clause, "t2.subproject_id = ?");
        assert_eq!(
            joins,
            " LEFT JOIN assets t1 ON t0.asset_id = t1.id LEFT JOIN phases t2 ON t1.phase_id = t2.id"
        );
        assert_eq!(params, 1);
    }

    #[test]
    fn test_shared_prefix_reuses_join() {
        let filters = [
            Filter::is("asset.phase.subproject", json!(1)),
            Filter::cond("asset.name", CompareOp::Contains, json!("bg")),
        ];
        let (_, joins, _) = compile_for(EntityKind::Task, &filters);
        assert_eq!(joins.matches("LEFT JOIN assets").count(), 1);
    }

    #[test]
    fn test_id_is_always_addressable() {
        let filters = [Filter::is("id", json!(5))];
        let (clause, _, _) = compile_for(EntityKind::Task, &filters);
        assert_eq!(clause, "t0.id = ?");

        let filters = [Filter::is("asset.id", json!(5))];
        let (clause, joins, _) = compile_for(EntityKind::Task, &filters);
        assert_eq!(clause, "t1.id = ?");
        assert!(joins.contains("LEFT JOIN assets t1"));
    }

    #[test]
    fn test_is_null_compiles_to_is_null() {
        let filters = [Filter::is("work_category", Json::Null)];
        let (clause, _, params) = compile_for(EntityKind::Asset, &filters);
        assert_eq!(clause, "t0.work_category_id IS NULL");
        assert_eq!(params, 0);
    }

    #[test]
    fn test_negation_is_null_safe() {
        let filters = [Filter::cond("step.color", CompareOp::IsNot, json!("255, 0, 0"))];
        let (clause, _, _) = compile_for(EntityKind::Asset, &filters);
        assert_eq!(clause, "(t1.color IS NULL OR t1.color != ?)");
    }

    #[test]
    fn test_link_dict_value_normalizes_to_id() {
        let filters = [Filter::is("phase", json!({"type": "Phase", "id": 9, "name": "P1"}))];
        let mut joins = JoinBuilder::new(EntityKind::Asset);
        let mut params = Vec::new();
        compile(&filters, GroupOp::All, &mut joins, &mut params).unwrap();
        assert_eq!(params, vec![rusqlite::types::Value::Integer(9)]);
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let filters = [Filter::cond("phase", CompareOp::In, json!([]))];
        let (clause, _, _) = compile_for(EntityKind::Asset, &filters);
        assert_eq!(clause, "0 = 1");
    }

    #[test]
    fn test_to_many_filter_compiles_to_exists() {
        let filters = [Filter::cond("assignees", CompareOp::In, json!([1, 2]))];
        let (clause, joins, params) = compile_for(EntityKind::Task, &filters);
        assert!(clause.starts_with("EXISTS (SELECT 1 FROM task_assignees"));
        assert!(joins.is_empty());
        assert_eq!(params, 2);
    }

    #[test]
    fn test_to_many_mid_path_is_rejected() {
        let filters = [Filter::is("assignees.name", json!("Aoki"))];
        let mut joins = JoinBuilder::new(EntityKind::Task);
        let mut params = Vec::new();
        let err = compile(&filters, GroupOp::All, &mut joins, &mut params).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }

    #[test]
    fn test_group_connectors_nest() {
        let filters = [
            Filter::is("status", json!("ip")),
            Filter::any(vec![
                Filter::is("name", json!("layout")),
                Filter::is("name", json!("anim")),
            ]),
        ];
        let (clause, _, _) = compile_for(EntityKind::Task, &filters);
        assert_eq!(clause, "t0.status = ? AND (t0.name = ? OR t0.name = ?)");
    }

    #[test]
    fn test_between_requires_two_bounds() {
        let filters = [Filter::cond("week", CompareOp::Between, json!(["2024-01-01"]))];
        let mut joins = JoinBuilder::new(EntityKind::PersonWorkload);
        let mut params = Vec::new();
        let err = compile(&filters, GroupOp::All, &mut joins, &mut params).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        let param = like_param(&json!("50%_done"), "name", "%", "%").unwrap();
        assert_eq!(param, rusqlite::types::Value::Text("%50\\%\\_done%".to_string()));
    }
}
