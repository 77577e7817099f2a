//! JSON boundary for the UI shell
//!
//! The desktop shell talks to the data layer in JSON-serializable shapes
//! only. Every entrypoint here takes and returns `serde_json::Value`;
//! engine failures are caught and converted to the uniform
//! `{error: true, message}` envelope instead of propagating raw.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value as Json};
use tracing::warn;

use crate::core::error::{QueryError, QueryResult};
use crate::core::schema::EntityKind;
use crate::core::value::normalize_json;
use crate::lock;
use crate::pages;
use crate::remap;
use crate::store::{Filter, FindOptions, GroupOp, OrderSpec, Store};

/// The bridge surface, borrowing the process-wide store handle
pub struct Bridge<'a> {
    store: &'a Store,
}

impl<'a> Bridge<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Generic query call:
    /// `{entity_type, filters?, fields?, order?, filter_operator?, limit?, page?}`
    pub fn query(&self, request: &Json) -> Json {
        envelope(self.try_query(request))
    }

    fn try_query(&self, request: &Json) -> QueryResult<Json> {
        let map = request.as_object().ok_or_else(|| {
            QueryError::InvalidFilter(format!("query request must be an object, got {request}"))
        })?;
        let kind = kind_of(map.get("entity_type"))?;
        let filters = Filter::parse_list(map.get("filters").unwrap_or(&Json::Null))?;

        let fields = match map.get("fields") {
            None | Some(Json::Null) => None,
            Some(Json::Array(items)) => Some(
                items
                    .iter()
                    .map(|f| {
                        f.as_str().map(str::to_string).ok_or_else(|| {
                            QueryError::InvalidFilter(format!("field names must be strings: {f}"))
                        })
                    })
                    .collect::<QueryResult<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(QueryError::InvalidFilter(format!(
                    "fields must be a list, got {other}"
                )));
            }
        };

        let opts = FindOptions {
            fields,
            order: OrderSpec::parse_list(map.get("order").unwrap_or(&Json::Null))?,
            filter_operator: map
                .get("filter_operator")
                .and_then(Json::as_str)
                .map(GroupOp::parse)
                .unwrap_or_default(),
            limit: map.get("limit").and_then(Json::as_u64).unwrap_or(0) as u32,
            page: map.get("page").and_then(Json::as_u64).unwrap_or(0) as u32,
        };

        let records = self.store.find(kind, &filters, &opts)?;
        to_json(&records)
    }

    /// Single-entity call, `null` when the id does not exist
    pub fn get(&self, entity_type: &str, id: i64) -> Json {
        envelope(self.try_get(entity_type, id))
    }

    fn try_get(&self, entity_type: &str, id: i64) -> QueryResult<Json> {
        let kind = EntityKind::from_name(entity_type)?;
        match pages::get_entity(self.store, kind, id)? {
            Some(record) => to_json(&record),
            None => Ok(Json::Null),
        }
    }

    /// Create from a `{type, ...fields}` payload
    pub fn create(&self, payload: &Json) -> Json {
        envelope(self.try_create(payload))
    }

    fn try_create(&self, payload: &Json) -> QueryResult<Json> {
        let map = payload.as_object().ok_or_else(|| {
            QueryError::InvalidFilter(format!("create payload must be an object, got {payload}"))
        })?;
        let kind = kind_of(map.get("type"))?;
        let data = normalize_json(payload);
        let data = data.as_object().unwrap_or(map);
        let fields = pages::default_field_list(kind);
        let mut record = self.store.create(kind, data, Some(&fields))?;
        remap::adjust_one(&mut record);
        to_json(&record)
    }

    /// Partial update from a `{type, ...fields}` payload
    pub fn update(&self, id: i64, payload: &Json) -> Json {
        envelope(self.try_update(id, payload))
    }

    fn try_update(&self, id: i64, payload: &Json) -> QueryResult<Json> {
        let map = payload.as_object().ok_or_else(|| {
            QueryError::InvalidFilter(format!("update payload must be an object, got {payload}"))
        })?;
        let kind = kind_of(map.get("type"))?;
        let data = normalize_json(payload);
        let data = data.as_object().unwrap_or(map);
        self.store.update(kind, id, data)?;
        // re-read with the default projection the UI expects
        match pages::get_entity(self.store, kind, id)? {
            Some(record) => to_json(&record),
            None => Ok(Json::Null),
        }
    }

    /// Delete an entity; `true` when a row was removed
    pub fn delete(&self, entity_type: &str, id: i64) -> Json {
        envelope(self.try_delete(entity_type, id))
    }

    fn try_delete(&self, entity_type: &str, id: i64) -> QueryResult<Json> {
        let kind = EntityKind::from_name(entity_type)?;
        Ok(Json::Bool(self.store.delete(kind, id)?))
    }

    /// Project page bundle for one subproject
    pub fn project_page(&self, subproject_id: i64) -> Json {
        envelope(pages::fetch_project_page(self.store, subproject_id).and_then(|p| to_json(&p)))
    }

    /// Distribute page bundle
    pub fn distribute_page(&self) -> Json {
        envelope(pages::fetch_distribute_page(self.store).and_then(|p| to_json(&p)))
    }

    /// Shared reference data bundle
    pub fn basic_data(&self, current_user_id: Option<i64>) -> Json {
        envelope(pages::fetch_basic_data(self.store, current_user_id).and_then(|p| to_json(&p)))
    }

    /// Assignment page bundle for an ISO date window
    pub fn assignment_page(&self, start: &str, end: &str) -> Json {
        envelope(self.try_assignment_page(start, end))
    }

    fn try_assignment_page(&self, start: &str, end: &str) -> QueryResult<Json> {
        let (start, end) = parse_window(start, end)?;
        to_json(&pages::fetch_assignment_page(self.store, start, end)?)
    }

    /// Tasks overlapping an ISO date window
    pub fn assignment_tasks(&self, start: &str, end: &str) -> Json {
        envelope(self.try_assignment_tasks(start, end))
    }

    fn try_assignment_tasks(&self, start: &str, end: &str) -> QueryResult<Json> {
        let (start, end) = parse_window(start, end)?;
        let tasks = pages::fetch_assignment_tasks(self.store, start, end)?;
        Ok(json!({ "tasks": to_json(&tasks)? }))
    }

    /// Workloads inside an ISO date window
    pub fn assignment_workloads(&self, start: &str, end: &str) -> Json {
        envelope(self.try_assignment_workloads(start, end))
    }

    fn try_assignment_workloads(&self, start: &str, end: &str) -> QueryResult<Json> {
        let (start, end) = parse_window(start, end)?;
        let workloads = pages::fetch_assignment_workloads(self.store, start, end)?;
        Ok(json!({ "personworkloads": to_json(&workloads)? }))
    }

    /// Merged startup snapshot
    pub fn init_load(
        &self,
        project_id: Option<i64>,
        person_list: &[i64],
        current_user_id: Option<i64>,
    ) -> Json {
        envelope(
            pages::init_load(self.store, project_id, person_list, current_user_id)
                .and_then(|p| to_json(&p)),
        )
    }

    /// Edit-lock acquire
    pub fn acquire_edit_lock(&self, subproject_id: i64, user_id: i64) -> Json {
        envelope(lock::acquire(self.store, subproject_id, user_id).and_then(|r| to_json(&r)))
    }

    /// Edit-lock heartbeat
    pub fn heartbeat_edit_lock(&self, subproject_id: i64, user_id: i64) -> Json {
        envelope(lock::heartbeat(self.store, subproject_id, user_id).and_then(|r| to_json(&r)))
    }

    /// Edit-lock release
    pub fn release_edit_lock(&self, subproject_id: i64, user_id: i64) -> Json {
        envelope(lock::release(self.store, subproject_id, user_id).and_then(|r| to_json(&r)))
    }
}

fn kind_of(value: Option<&Json>) -> QueryResult<EntityKind> {
    let name = value
        .and_then(Json::as_str)
        .ok_or_else(|| QueryError::UnknownEntity("<missing entity type>".to_string()))?;
    EntityKind::from_name(name)
}

fn parse_window(start: &str, end: &str) -> QueryResult<(NaiveDate, NaiveDate)> {
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            QueryError::InvalidFilter(format!("'{s}' is not a YYYY-MM-DD date"))
        })
    };
    Ok((parse(start)?, parse(end)?))
}

fn to_json<T: Serialize>(value: &T) -> QueryResult<Json> {
    serde_json::to_value(value)
        .map_err(|e| QueryError::Validation(format!("serialization failed: {e}")))
}

/// Convert an engine failure into the uniform error envelope
fn envelope(result: QueryResult<Json>) -> Json {
    match result {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "bridge call failed");
            json!({"error": true, "message": err.to_string()})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> Store {
        let store = Store::open_in_memory().unwrap();
        let bridge = Bridge::new(&store);
        let subproject = bridge.create(&json!({
            "type": "Subproject",
            "name": "Alpha",
            "start_date": "2024-01-01",
            "end_date": "2024-06-28"
        }));
        assert_eq!(subproject["id"], json!(1));
        bridge.create(&json!({
            "type": "Phase",
            "subproject": 1,
            "name": "DESIGN",
            "start_date": "2024-01-01",
            "end_date": "2024-03-29"
        }));
        store
    }

    #[test]
    fn test_query_returns_records_with_id_and_type() {
        let store = seeded();
        let bridge = Bridge::new(&store);
        let result = bridge.query(&json!({
            "entity_type": "Phase",
            "filters": [["subproject", "is", 1]],
            "fields": ["name", "subproject"]
        }));
        let rows = result.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["type"], json!("Phase"));
        assert_eq!(rows[0]["name"], json!("DESIGN"));
        assert_eq!(rows[0]["subproject"]["name"], json!("Alpha"));
    }

    #[test]
    fn test_unknown_entity_type_becomes_error_envelope() {
        let store = seeded();
        let bridge = Bridge::new(&store);
        let result = bridge.query(&json!({"entity_type": "Shot", "filters": []}));
        assert_eq!(result["error"], json!(true));
        assert!(result["message"].as_str().unwrap().contains("Shot"));
    }

    #[test]
    fn test_create_validation_becomes_error_envelope() {
        let store = seeded();
        let bridge = Bridge::new(&store);
        let result = bridge.create(&json!({
            "type": "Phase",
            "subproject": 4242,
            "name": "PRODT",
            "start_date": "2024-04-01",
            "end_date": "2024-06-28"
        }));
        assert_eq!(result["error"], json!(true));
    }

    #[test]
    fn test_get_missing_entity_is_null() {
        let store = seeded();
        let bridge = Bridge::new(&store);
        assert_eq!(bridge.get("Subproject", 9999), Json::Null);
    }

    #[test]
    fn test_update_and_delete_round_trip() {
        let store = seeded();
        let bridge = Bridge::new(&store);
        let updated = bridge.update(1, &json!({"type": "Phase", "name": "PRODT"}));
        assert_eq!(updated["name"], json!("PRODT"));
        assert_eq!(bridge.delete("Phase", 1), json!(true));
        assert_eq!(bridge.delete("Phase", 1), json!(false));
    }

    #[test]
    fn test_project_page_shape_is_stable() {
        let store = seeded();
        let bridge = Bridge::new(&store);
        let page = bridge.project_page(1);
        for key in
            ["phases", "assets", "tasks", "personworkloads", "pmmworkloads", "milestoneTasks"]
        {
            assert!(page[key].is_array(), "missing key {key}");
        }
        let empty = bridge.project_page(9999);
        assert!(empty["phases"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_lock_calls_use_wire_shape() {
        let store = seeded();
        let bridge = Bridge::new(&store);
        let person = bridge.create(&json!({
            "type": "Person",
            "name": "Aoki",
            "email": "aoki@studio.example"
        }));
        let user = person["id"].as_i64().unwrap();
        let granted = bridge.acquire_edit_lock(1, user);
        assert_eq!(granted, json!({"success": true}));
        let released = bridge.release_edit_lock(1, user);
        assert_eq!(released, json!({"success": true}));
    }
}
