//! Generic entity query engine
//!
//! `find`/`find_one`/`create`/`update`/`delete`/`summarize` over any
//! declared entity kind. Filters, ordering and pagination compile to a
//! single SQL statement; matched rows are then serialized through the
//! link formatter and dotted-path resolver according to the requested
//! projection.

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter};
use serde_json::Value as Json;
use tracing::debug;

use crate::core::error::{QueryError, QueryResult};
use crate::core::schema::{EntityKind, FieldDef, FieldType};
use crate::core::value::{Record, Value};

use super::filter::{self, ColumnRef, Filter, GroupOp, JoinBuilder};
use super::resolve::parse_datetime;
use super::Store;

/// Sort direction of one ordering spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    fn sql(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

/// One ordering key; dotted fields sort by the joined column
#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub field: String,
    pub direction: Direction,
}

impl OrderSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Ascending }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: Direction::Descending }
    }

    /// Parse a wire ordering spec: either `{field, direction}` (accepting
    /// the `field_name`/`name` aliases) or a bare string, with a leading
    /// `-` meaning descending
    pub fn parse(json: &Json) -> QueryResult<Self> {
        match json {
            Json::String(s) => {
                if let Some(rest) = s.strip_prefix('-') {
                    Ok(Self::desc(rest))
                } else {
                    Ok(Self::asc(s.clone()))
                }
            }
            Json::Object(map) => {
                let field = map
                    .get("field_name")
                    .or_else(|| map.get("field"))
                    .or_else(|| map.get("name"))
                    .and_then(Json::as_str)
                    .ok_or_else(|| {
                        QueryError::InvalidFilter(format!("ordering spec without a field: {json}"))
                    })?;
                let descending = map
                    .get("direction")
                    .and_then(Json::as_str)
                    .map(|d| d.to_ascii_lowercase().starts_with("desc"))
                    .unwrap_or(false);
                Ok(Self {
                    field: field.to_string(),
                    direction: if descending { Direction::Descending } else { Direction::Ascending },
                })
            }
            other => Err(QueryError::InvalidFilter(format!("invalid ordering spec: {other}"))),
        }
    }

    pub fn parse_list(json: &Json) -> QueryResult<Vec<Self>> {
        match json {
            Json::Null => Ok(Vec::new()),
            Json::Array(items) => items.iter().map(Self::parse).collect(),
            other => {
                Err(QueryError::InvalidFilter(format!("ordering must be a list, got {other}")))
            }
        }
    }
}

/// Projection, ordering and pagination options for [`Store::find`]
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Requested fields; `None` projects every direct attribute and
    /// to-many edge
    pub fields: Option<Vec<String>>,
    pub order: Vec<OrderSpec>,
    /// Connector for the top-level filter list
    pub filter_operator: GroupOp,
    /// 0 means unbounded
    pub limit: u32,
    /// 1-indexed, only meaningful with `limit > 0`
    pub page: u32,
}

impl FindOptions {
    pub fn with_fields<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self { fields: Some(fields.into_iter().map(Into::into).collect()), ..Self::default() }
    }
}

/// Aggregate requested from [`Store::summarize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Count,
    Sum,
}

/// One summary column spec
#[derive(Debug, Clone)]
pub struct SummarySpec {
    pub column: String,
    pub kind: SummaryKind,
}

impl Store {
    /// Run a filtered, ordered, paginated query and serialize each match
    pub fn find(
        &self,
        kind: EntityKind,
        filters: &[Filter],
        opts: &FindOptions,
    ) -> QueryResult<Vec<Record>> {
        let schema = kind.schema();
        let mut joins = JoinBuilder::new(kind);
        let mut params = Vec::new();
        let clause = filter::compile(filters, opts.filter_operator, &mut joins, &mut params)?;

        let mut order_parts = Vec::with_capacity(opts.order.len() + 1);
        for spec in &opts.order {
            match joins.column(&spec.field)? {
                ColumnRef::Direct { expr, .. } => {
                    order_parts.push(format!("{} {}", expr, spec.direction.sql()));
                }
                ColumnRef::Many { .. } => {
                    return Err(QueryError::InvalidFilter(format!(
                        "cannot order by to-many field '{}'",
                        spec.field
                    )));
                }
            }
        }
        // stable tiebreaker so composite sorts and pagination agree
        order_parts.push("t0.id ASC".to_string());

        let mut sql = format!("SELECT t0.id FROM {} t0{}", schema.table, joins.joins_sql());
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_parts.join(", "));
        if opts.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", opts.limit));
            if opts.page > 0 {
                sql.push_str(&format!(" OFFSET {}", (opts.page - 1) * opts.limit));
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let ids: Vec<i64> = stmt
            .query_map(params_from_iter(params), |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let fields = opts.fields.as_deref();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.serialize_record(kind, id, fields)? {
                records.push(record);
            }
        }
        debug!(kind = %kind, rows = records.len(), "find");
        Ok(records)
    }

    /// Fetch a single entity by id, `None` if it does not exist
    pub fn find_one(
        &self,
        kind: EntityKind,
        id: i64,
        fields: Option<&[String]>,
    ) -> QueryResult<Option<Record>> {
        self.serialize_record(kind, id, fields)
    }

    /// Insert a new entity and return its serialized record
    pub fn create(
        &self,
        kind: EntityKind,
        data: &serde_json::Map<String, Json>,
        fields: Option<&[String]>,
    ) -> QueryResult<Record> {
        let schema = kind.schema();
        let mut columns = Vec::new();
        let mut params = Vec::new();
        let mut many: Vec<(&'static FieldDef, Vec<i64>)> = Vec::new();

        for (key, raw) in data {
            if key == "id" || key == "type" {
                continue;
            }
            let field = schema.field(key).ok_or_else(|| {
                QueryError::Validation(format!("unknown field '{key}' for {kind}"))
            })?;
            match field.ty {
                FieldType::ToMany { target, .. } => {
                    let ids = reference_id_list(key, raw)?;
                    for id in &ids {
                        self.ensure_reference(target, *id)?;
                    }
                    many.push((field, ids));
                }
                FieldType::ToOne(target) => {
                    let reference = reference_id(key, raw)?;
                    if let Some(id) = reference {
                        self.ensure_reference(target, id)?;
                    }
                    columns.push(field.column);
                    params.push(match reference {
                        Some(id) => rusqlite::types::Value::Integer(id),
                        None => rusqlite::types::Value::Null,
                    });
                }
                _ => {
                    columns.push(field.column);
                    params.push(scalar_param(field, raw)?);
                }
            }
        }

        let id = if columns.is_empty() {
            self.conn
                .execute(&format!("INSERT INTO {} DEFAULT VALUES", schema.table), [])?;
            self.conn.last_insert_rowid()
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                schema.table,
                columns.join(", "),
                placeholders
            );
            self.conn.execute(&sql, params_from_iter(params))?;
            self.conn.last_insert_rowid()
        };

        for (field, ids) in many {
            self.replace_many(id, field, &ids)?;
        }

        debug!(kind = %kind, id, "create");
        self.serialize_record(kind, id, fields)?
            .ok_or(QueryError::NotFound { kind, id })
    }

    /// Partially update named fields of an existing entity
    pub fn update(
        &self,
        kind: EntityKind,
        id: i64,
        data: &serde_json::Map<String, Json>,
    ) -> QueryResult<Record> {
        let schema = kind.schema();
        if !self.exists(kind, id)? {
            return Err(QueryError::NotFound { kind, id });
        }

        let mut assignments = Vec::new();
        let mut params = Vec::new();
        let mut many: Vec<(&'static FieldDef, Vec<i64>)> = Vec::new();

        for (key, raw) in data {
            if key == "id" || key == "type" {
                continue;
            }
            let field = schema.field(key).ok_or_else(|| {
                QueryError::Validation(format!("unknown field '{key}' for {kind}"))
            })?;
            match field.ty {
                FieldType::ToMany { target, .. } => {
                    let ids = reference_id_list(key, raw)?;
                    for id in &ids {
                        self.ensure_reference(target, *id)?;
                    }
                    many.push((field, ids));
                }
                FieldType::ToOne(target) => {
                    let reference = reference_id(key, raw)?;
                    if let Some(rid) = reference {
                        self.ensure_reference(target, rid)?;
                    }
                    assignments.push(format!("{} = ?", field.column));
                    params.push(match reference {
                        Some(rid) => rusqlite::types::Value::Integer(rid),
                        None => rusqlite::types::Value::Null,
                    });
                }
                _ => {
                    assignments.push(format!("{} = ?", field.column));
                    params.push(scalar_param(field, raw)?);
                }
            }
        }

        if !assignments.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                schema.table,
                assignments.join(", ")
            );
            params.push(rusqlite::types::Value::Integer(id));
            self.conn.execute(&sql, params_from_iter(params))?;
        }
        for (field, ids) in many {
            self.replace_many(id, field, &ids)?;
        }

        debug!(kind = %kind, id, "update");
        self.serialize_record(kind, id, None)?
            .ok_or(QueryError::NotFound { kind, id })
    }

    /// Delete an entity, cascading per the schema rules.
    ///
    /// Returns whether a row was actually removed.
    pub fn delete(&self, kind: EntityKind, id: i64) -> QueryResult<bool> {
        let affected = self
            .conn
            .execute(&format!("DELETE FROM {} WHERE id = ?1", kind.schema().table), params![id])?;
        debug!(kind = %kind, id, removed = affected > 0, "delete");
        Ok(affected > 0)
    }

    /// Aggregate over the filtered set, one entry per requested column
    pub fn summarize(
        &self,
        kind: EntityKind,
        filters: &[Filter],
        summary_fields: &[SummarySpec],
    ) -> QueryResult<BTreeMap<String, Value>> {
        let schema = kind.schema();
        let mut results = BTreeMap::new();

        for spec in summary_fields {
            let mut joins = JoinBuilder::new(kind);
            let mut params = Vec::new();
            let clause = filter::compile(filters, GroupOp::All, &mut joins, &mut params)?;
            let expr = match joins.column(&spec.column)? {
                ColumnRef::Direct { expr, .. } => expr,
                ColumnRef::Many { .. } => {
                    return Err(QueryError::InvalidFilter(format!(
                        "cannot summarize to-many field '{}'",
                        spec.column
                    )));
                }
            };

            let aggregate = match spec.kind {
                SummaryKind::Count => format!("COUNT({expr})"),
                SummaryKind::Sum => format!("SUM({expr})"),
            };
            let mut sql =
                format!("SELECT {} FROM {} t0{}", aggregate, schema.table, joins.joins_sql());
            if !clause.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }

            let value = match spec.kind {
                SummaryKind::Count => {
                    let count: i64 =
                        self.conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
                    Value::Int(count)
                }
                SummaryKind::Sum => {
                    let sum: Option<f64> =
                        self.conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
                    sum.map(Value::Float).unwrap_or(Value::Null)
                }
            };
            results.insert(spec.column.clone(), value);
        }

        Ok(results)
    }

    fn ensure_reference(&self, kind: EntityKind, id: i64) -> QueryResult<()> {
        if self.exists(kind, id)? {
            Ok(())
        } else {
            Err(QueryError::Validation(format!(
                "referenced {kind} with id {id} does not exist"
            )))
        }
    }

    /// Replace the link rows of a to-many edge with the given target ids
    fn replace_many(&self, id: i64, field: &FieldDef, ids: &[i64]) -> QueryResult<()> {
        let FieldType::ToMany { join_table, own_col, target_col, .. } = field.ty else {
            return Ok(());
        };
        self.conn
            .execute(&format!("DELETE FROM {join_table} WHERE {own_col} = ?1"), params![id])?;
        let sql =
            format!("INSERT INTO {join_table} ({own_col}, {target_col}) VALUES (?1, ?2)");
        for target_id in ids {
            self.conn.execute(&sql, params![id, target_id])?;
        }
        Ok(())
    }
}

/// Extract the id of a reference value: a bare integer or a link dict
fn reference_id(field: &str, value: &Json) -> QueryResult<Option<i64>> {
    match value {
        Json::Null => Ok(None),
        Json::Number(n) => n.as_i64().map(Some).ok_or_else(|| {
            QueryError::Validation(format!("'{field}' expects an integer id, got {value}"))
        }),
        Json::Object(map) => match map.get("id").and_then(Json::as_i64) {
            Some(id) => Ok(Some(id)),
            None => Err(QueryError::Validation(format!(
                "'{field}' expects an id or a link dict with an id, got {value}"
            ))),
        },
        other => Err(QueryError::Validation(format!(
            "'{field}' expects an id or a link dict, got {other}"
        ))),
    }
}

fn reference_id_list(field: &str, value: &Json) -> QueryResult<Vec<i64>> {
    let items = match value {
        Json::Null => return Ok(Vec::new()),
        Json::Array(items) => items,
        other => {
            return Err(QueryError::Validation(format!(
                "'{field}' expects a list of ids or link dicts, got {other}"
            )));
        }
    };
    items
        .iter()
        .map(|item| {
            reference_id(field, item)?.ok_or_else(|| {
                QueryError::Validation(format!("'{field}' does not accept null elements"))
            })
        })
        .collect()
}

/// Convert a caller-supplied scalar to its stored form, by declared type
fn scalar_param(field: &FieldDef, value: &Json) -> QueryResult<rusqlite::types::Value> {
    if value.is_null() {
        return Ok(rusqlite::types::Value::Null);
    }
    match field.ty {
        FieldType::Bool => match value {
            Json::Bool(b) => Ok(rusqlite::types::Value::Integer(*b as i64)),
            other => Err(QueryError::Validation(format!(
                "'{}' expects a boolean, got {other}",
                field.name
            ))),
        },
        FieldType::Int => value.as_i64().map(rusqlite::types::Value::Integer).ok_or_else(|| {
            QueryError::Validation(format!("'{}' expects an integer, got {value}", field.name))
        }),
        FieldType::Decimal => value.as_f64().map(rusqlite::types::Value::Real).ok_or_else(|| {
            QueryError::Validation(format!("'{}' expects a number, got {value}", field.name))
        }),
        FieldType::Text => match value {
            Json::String(s) => Ok(rusqlite::types::Value::Text(s.clone())),
            other => Err(QueryError::Validation(format!(
                "'{}' expects a string, got {other}",
                field.name
            ))),
        },
        FieldType::Date => {
            let s = value.as_str().ok_or_else(|| {
                QueryError::Validation(format!(
                    "'{}' expects a YYYY-MM-DD string, got {value}",
                    field.name
                ))
            })?;
            let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                QueryError::Validation(format!("'{}' is not a valid date: '{s}'", field.name))
            })?;
            Ok(rusqlite::types::Value::Text(date.format("%Y-%m-%d").to_string()))
        }
        FieldType::DateTime => {
            let s = value.as_str().ok_or_else(|| {
                QueryError::Validation(format!(
                    "'{}' expects a timestamp string, got {value}",
                    field.name
                ))
            })?;
            let stamp = parse_datetime(s).ok_or_else(|| {
                QueryError::Validation(format!(
                    "'{}' is not a valid timestamp: '{s}'",
                    field.name
                ))
            })?;
            Ok(rusqlite::types::Value::Text(
                stamp.format(crate::core::value::DATETIME_FORMAT).to_string(),
            ))
        }
        FieldType::ToOne(_) | FieldType::ToMany { .. } => Err(QueryError::Validation(format!(
            "'{}' is a relationship field",
            field.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{record_id, record_kind, Link};
    use crate::store::filter::CompareOp;
    use serde_json::json;

    fn data(value: Json) -> serde_json::Map<String, Json> {
        value.as_object().cloned().unwrap()
    }

    struct Fixture {
        store: Store,
        subproject: i64,
        phase: i64,
        asset: i64,
        bare_asset: i64,
        task: i64,
        person: i64,
        step: i64,
    }

    /// One subproject with a phase, a stepped asset with one task, and a
    /// second asset with no step or work category.
    fn fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        let person = record_id(
            &store
                .create(
                    EntityKind::Person,
                    &data(json!({"name": "Aoki", "email": "aoki@studio.example"})),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        let step = record_id(
            &store
                .create(
                    EntityKind::Step,
                    &data(json!({"name": "Layout", "color": "128, 32, 32"})),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        let subproject = record_id(
            &store
                .create(
                    EntityKind::Subproject,
                    &data(json!({
                        "name": "Alpha",
                        "start_date": "2024-01-01",
                        "end_date": "2024-06-28",
                        "access": "Project Team",
                        "pmm_status": "planning"
                    })),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        let phase = record_id(
            &store
                .create(
                    EntityKind::Phase,
                    &data(json!({
                        "subproject": subproject,
                        "name": "DESIGN",
                        "start_date": "2024-01-01",
                        "end_date": "2024-03-29",
                        "milestone": false,
                        "phase_type": "DESIGN"
                    })),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        let asset = record_id(
            &store
                .create(
                    EntityKind::Asset,
                    &data(json!({
                        "phase": phase,
                        "name": "bg_hall",
                        "start_date": "2024-01-08",
                        "end_date": "2024-02-16",
                        "asset_type": "EXT",
                        "step": step
                    })),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        let bare_asset = record_id(
            &store
                .create(
                    EntityKind::Asset,
                    &data(json!({
                        "phase": phase,
                        "name": "prop_lantern",
                        "start_date": "2024-01-08",
                        "end_date": "2024-02-02",
                        "asset_type": "INT"
                    })),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        let task = record_id(
            &store
                .create(
                    EntityKind::Task,
                    &data(json!({
                        "asset": asset,
                        "name": "modeling",
                        "start_date": "2024-01-08",
                        "end_date": "2024-01-19",
                        "status": "ip",
                        "assignees": [person]
                    })),
                    None,
                )
                .unwrap(),
        )
        .unwrap();
        Fixture { store, subproject, phase, asset, bare_asset, task, person, step }
    }

    #[test]
    fn test_create_then_find_one_round_trips() {
        let f = fixture();
        let record = f.store.find_one(EntityKind::Task, f.task, None).unwrap().unwrap();
        assert_eq!(record_kind(&record), Some(EntityKind::Task));
        assert_eq!(record.get("name"), Some(&Value::Text("modeling".to_string())));
        assert_eq!(record.get("status"), Some(&Value::Text("ip".to_string())));
        match record.get("asset") {
            Some(Value::Link(link)) => {
                assert_eq!(link.id, f.asset);
                assert_eq!(link.kind, EntityKind::Asset);
                assert_eq!(link.name, "bg_hall");
            }
            other => panic!("expected an asset link, got {other:?}"),
        }
        match record.get("assignees") {
            Some(Value::LinkList(links)) => {
                assert_eq!(links.len(), 1);
                assert_eq!(links[0], Link::new(EntityKind::Person, f.person, "Aoki"));
            }
            other => panic!("expected a link list, got {other:?}"),
        }
    }

    #[test]
    fn test_find_one_missing_returns_none() {
        let f = fixture();
        assert!(f.store.find_one(EntityKind::Task, 9999, None).unwrap().is_none());
    }

    #[test]
    fn test_projection_injects_id_and_type() {
        let f = fixture();
        let fields = vec!["name".to_string()];
        let record =
            f.store.find_one(EntityKind::Asset, f.asset, Some(&fields)).unwrap().unwrap();
        assert_eq!(record.len(), 3);
        assert!(record.contains_key("id"));
        assert!(record.contains_key("type"));
        assert!(record.contains_key("name"));
    }

    #[test]
    fn test_projection_keeps_unresolvable_keys_as_null() {
        let f = fixture();
        let fields = vec!["name".to_string(), "step.color".to_string()];
        let records = f
            .store
            .find(EntityKind::Asset, &[], &FindOptions::with_fields(fields))
            .unwrap();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert!(record.contains_key("step.color"), "uniform row shape");
        }
        let bare = records.iter().find(|r| record_id(r) == Some(f.bare_asset)).unwrap();
        assert_eq!(bare.get("step.color"), Some(&Value::Null));
        let stepped = records.iter().find(|r| record_id(r) == Some(f.asset)).unwrap();
        assert_eq!(stepped.get("step.color"), Some(&Value::Text("128, 32, 32".to_string())));
    }

    #[test]
    fn test_dotted_filter_matches_across_relationships() {
        let f = fixture();
        let filters = [Filter::is("asset.phase.subproject", json!(f.subproject))];
        let records = f.store.find(EntityKind::Task, &filters, &FindOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(record_id(&records[0]), Some(f.task));
    }

    #[test]
    fn test_null_intermediate_fails_positive_filter() {
        let f = fixture();
        // bare_asset has no step, so a positive condition on step.color
        // must not match it
        let filters = [Filter::is("step.color", json!("128, 32, 32"))];
        let records = f.store.find(EntityKind::Asset, &filters, &FindOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(record_id(&records[0]), Some(f.asset));
    }

    #[test]
    fn test_null_intermediate_matches_negative_filter() {
        let f = fixture();
        let filters = [Filter::cond("step.color", CompareOp::IsNot, json!("128, 32, 32"))];
        let records = f.store.find(EntityKind::Asset, &filters, &FindOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(record_id(&records[0]), Some(f.bare_asset));

        let filters = [Filter::cond("step.color", CompareOp::NotIn, json!(["128, 32, 32"]))];
        let records = f.store.find(EntityKind::Asset, &filters, &FindOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(record_id(&records[0]), Some(f.bare_asset));
    }

    #[test]
    fn test_any_connector_combines_with_or() {
        let f = fixture();
        let filters =
            [Filter::is("name", json!("bg_hall")), Filter::is("name", json!("prop_lantern"))];
        let all = f.store.find(EntityKind::Asset, &filters, &FindOptions::default()).unwrap();
        assert!(all.is_empty());
        let opts = FindOptions { filter_operator: GroupOp::Any, ..Default::default() };
        let any = f.store.find(EntityKind::Asset, &filters, &opts).unwrap();
        assert_eq!(any.len(), 2);
    }

    #[test]
    fn test_to_many_membership_filter() {
        let f = fixture();
        let filters = [Filter::cond("assignees", CompareOp::In, json!([f.person]))];
        let records = f.store.find(EntityKind::Task, &filters, &FindOptions::default()).unwrap();
        assert_eq!(records.len(), 1);

        let filters = [Filter::cond("assignees", CompareOp::In, json!([f.person + 100]))];
        let records = f.store.find(EntityKind::Task, &filters, &FindOptions::default()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_ordering_and_pagination() {
        let f = fixture();
        for i in 0..25 {
            f.store
                .create(
                    EntityKind::Task,
                    &data(json!({
                        "asset": f.asset,
                        "name": format!("shot_{:02}", i),
                        "start_date": "2024-02-01",
                        "end_date": "2024-02-09",
                        "status": "wtg"
                    })),
                    None,
                )
                .unwrap();
        }
        let opts = FindOptions {
            order: vec![OrderSpec::asc("name")],
            limit: 10,
            page: 2,
            ..Default::default()
        };
        let filters = [Filter::is("status", json!("wtg"))];
        let page2 = f.store.find(EntityKind::Task, &filters, &opts).unwrap();
        assert_eq!(page2.len(), 10);
        assert_eq!(page2[0].get("name"), Some(&Value::Text("shot_10".to_string())));
        assert_eq!(page2[9].get("name"), Some(&Value::Text("shot_19".to_string())));

        // limit=0 ignores page and returns everything
        let opts = FindOptions { page: 2, ..Default::default() };
        let all = f.store.find(EntityKind::Task, &filters, &opts).unwrap();
        assert_eq!(all.len(), 25);
    }

    #[test]
    fn test_descending_order() {
        let f = fixture();
        let opts = FindOptions { order: vec![OrderSpec::desc("name")], ..Default::default() };
        let records = f.store.find(EntityKind::Asset, &[], &opts).unwrap();
        assert_eq!(records[0].get("name"), Some(&Value::Text("prop_lantern".to_string())));
    }

    #[test]
    fn test_between_filter_on_dates() {
        let f = fixture();
        let filters =
            [Filter::cond("start_date", CompareOp::Between, json!(["2024-01-01", "2024-01-31"]))];
        let records = f.store.find(EntityKind::Task, &filters, &FindOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(record_id(&records[0]), Some(f.task));
    }

    #[test]
    fn test_create_rejects_unknown_field() {
        let f = fixture();
        let err = f
            .store
            .create(EntityKind::Step, &data(json!({"name": "Anim", "tint": "red"})), None)
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_create_rejects_dangling_reference() {
        let f = fixture();
        let err = f
            .store
            .create(
                EntityKind::Phase,
                &data(json!({
                    "subproject": 4242,
                    "name": "PRODT",
                    "start_date": "2024-04-01",
                    "end_date": "2024-06-28",
                    "phase_type": "PRODT"
                })),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let f = fixture();
        let err = f
            .store
            .update(EntityKind::Task, 9999, &data(json!({"status": "fin"})))
            .unwrap_err();
        assert!(matches!(err, QueryError::NotFound { .. }));
    }

    #[test]
    fn test_update_clears_nullable_reference() {
        let f = fixture();
        let record = f
            .store
            .update(EntityKind::Asset, f.asset, &data(json!({"step": null})))
            .unwrap();
        assert_eq!(record.get("step"), Some(&Value::Null));
    }

    #[test]
    fn test_delete_cascades_down_the_hierarchy() {
        let f = fixture();
        assert!(f.store.delete(EntityKind::Subproject, f.subproject).unwrap());
        assert!(f.store.find_one(EntityKind::Phase, f.phase, None).unwrap().is_none());
        assert!(f.store.find_one(EntityKind::Asset, f.asset, None).unwrap().is_none());
        assert!(f.store.find_one(EntityKind::Task, f.task, None).unwrap().is_none());
        // second delete finds nothing
        assert!(!f.store.delete(EntityKind::Subproject, f.subproject).unwrap());
    }

    #[test]
    fn test_delete_step_nullifies_asset_reference() {
        let f = fixture();
        assert!(f.store.delete(EntityKind::Step, f.step).unwrap());
        let record = f.store.find_one(EntityKind::Asset, f.asset, None).unwrap().unwrap();
        assert_eq!(record.get("step"), Some(&Value::Null));
    }

    #[test]
    fn test_summarize_count_and_sum() {
        let f = fixture();
        for (week, effort) in [("2024-01-08", 0.5), ("2024-01-15", 1.0)] {
            f.store
                .create(
                    EntityKind::PersonWorkload,
                    &data(json!({
                        "task": f.task,
                        "person": f.person,
                        "name": "modeling",
                        "week": week,
                        "man_week": effort
                    })),
                    None,
                )
                .unwrap();
        }
        let summary = f
            .store
            .summarize(
                EntityKind::PersonWorkload,
                &[Filter::is("task", json!(f.task))],
                &[
                    SummarySpec { column: "id".to_string(), kind: SummaryKind::Count },
                    SummarySpec { column: "man_week".to_string(), kind: SummaryKind::Sum },
                ],
            )
            .unwrap();
        assert_eq!(summary.get("id"), Some(&Value::Int(2)));
        assert_eq!(summary.get("man_week"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_resolve_path_null_intermediate_is_null() {
        let f = fixture();
        let value =
            f.store.resolve_path(EntityKind::Asset, f.bare_asset, "step.color").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_resolve_path_unknown_segment_is_null() {
        let f = fixture();
        let value = f.store.resolve_path(EntityKind::Asset, f.asset, "rig.color").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_resolve_path_to_many_mid_path_is_null() {
        let f = fixture();
        let value =
            f.store.resolve_path(EntityKind::Task, f.task, "assignees.name").unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_resolve_path_terminal_to_many_is_link_list() {
        let f = fixture();
        let value = f.store.resolve_path(EntityKind::Task, f.task, "assignees").unwrap();
        match value {
            Value::LinkList(links) => assert_eq!(links[0].id, f.person),
            other => panic!("expected a link list, got {other:?}"),
        }
    }
}
