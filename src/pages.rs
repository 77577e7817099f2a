//! Composite page bundles for the desktop UI
//!
//! Each UI page loads one fixed-shape bundle assembled from chained
//! dependent queries: Subproject → Phase → Asset → Task/MilestoneTask →
//! PersonWorkload, plus the Subproject-level PMMWorkloads. An empty parent
//! id set short-circuits to empty child lists instead of issuing a query
//! with an empty `in` list, and a missing parent degrades the whole bundle
//! to all-empty lists so the UI always receives a well-shaped object.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::core::error::QueryResult;
use crate::core::schema::EntityKind;
use crate::core::value::{record_id, Record};
use crate::remap;
use crate::store::{Filter, FindOptions, Store};

/// Default projection per kind, including the dotted composite keys the
/// remap layer flattens for the UI
pub fn default_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Department => &["id", "name", "description"],
        EntityKind::Step => &["id", "name", "color"],
        EntityKind::Person => &["id", "name", "email", "department", "manager", "subproject"],
        EntityKind::WorkCategory => &["id", "name", "description"],
        EntityKind::Subproject => &[
            "id",
            "name",
            "start_date",
            "end_date",
            "editing",
            "department",
            "access",
            "pmm_status",
            "last_edit",
        ],
        EntityKind::Phase => {
            &["id", "subproject", "name", "start_date", "end_date", "milestone", "phase_type"]
        }
        EntityKind::Asset => &[
            "id",
            "phase",
            "name",
            "start_date",
            "end_date",
            "asset_type",
            "work_category",
            "step",
            "step.color",
        ],
        EntityKind::Task => &[
            "id",
            "asset",
            "name",
            "start_date",
            "end_date",
            "assignees",
            "status",
            "asset.phase.subproject",
            "asset.work_category",
        ],
        EntityKind::MilestoneTask => &[
            "id",
            "asset",
            "name",
            "start_date",
            "end_date",
            "milestone_type",
            "asset.phase.subproject",
            "asset.asset_type",
        ],
        EntityKind::PersonWorkload => &[
            "id",
            "task",
            "person",
            "name",
            "week",
            "man_week",
            "task.asset.phase.subproject",
        ],
        EntityKind::PmmWorkload => {
            &["id", "subproject", "work_category", "name", "week", "man_week"]
        }
    }
}

/// Owned default field list, as the engine's projection argument
pub fn default_field_list(kind: EntityKind) -> Vec<String> {
    default_fields(kind).iter().map(|f| (*f).to_string()).collect()
}

/// Fetch entities with the default projection and flattened field names
pub fn get_entities(store: &Store, kind: EntityKind, filters: &[Filter]) -> QueryResult<Vec<Record>> {
    let opts = FindOptions { fields: Some(default_field_list(kind)), ..Default::default() };
    let mut records = store.find(kind, filters, &opts)?;
    remap::adjust(&mut records);
    Ok(records)
}

/// Fetch one entity with the default projection, `None` if missing
pub fn get_entity(store: &Store, kind: EntityKind, id: i64) -> QueryResult<Option<Record>> {
    let fields = default_field_list(kind);
    let record = store.find_one(kind, id, Some(&fields))?;
    Ok(record.map(|mut r| {
        remap::adjust_one(&mut r);
        r
    }))
}

/// Everything one project view needs
#[derive(Debug, Default, Serialize)]
pub struct ProjectPage {
    pub phases: Vec<Record>,
    pub assets: Vec<Record>,
    pub tasks: Vec<Record>,
    pub personworkloads: Vec<Record>,
    pub pmmworkloads: Vec<Record>,
    #[serde(rename = "milestoneTasks")]
    pub milestone_tasks: Vec<Record>,
}

/// Subprojects and phases for the distribute view
#[derive(Debug, Serialize)]
pub struct DistributePage {
    pub subprojects: Vec<Record>,
    pub phases: Vec<Record>,
}

/// Reference data every view shares
#[derive(Debug, Serialize)]
pub struct BasicData {
    pub person: Vec<Record>,
    pub steps: Vec<Record>,
    #[serde(rename = "workCategories")]
    pub work_categories: Vec<Record>,
    #[serde(rename = "currentUser")]
    pub current_user: Option<Record>,
}

/// Tasks and workloads overlapping a date window, plus everyone
#[derive(Debug, Serialize)]
pub struct AssignmentPage {
    pub tasks: Vec<Record>,
    pub personworkloads: Vec<Record>,
    pub person: Vec<Record>,
}

/// Merged startup snapshot
#[derive(Debug, Serialize)]
pub struct InitLoad {
    pub steps: Vec<Record>,
    pub subprojects: Vec<Record>,
    pub phases: Vec<Record>,
    pub person: Vec<Record>,
    #[serde(rename = "workCategories")]
    pub work_categories: Vec<Record>,
    #[serde(rename = "selectedSubprojectId")]
    pub selected_subproject_id: Option<i64>,
    #[serde(rename = "selectedPersonList")]
    pub selected_person_list: Vec<i64>,
    #[serde(rename = "currentUser")]
    pub current_user: Option<Record>,
}

fn ids_of(records: &[Record]) -> Vec<i64> {
    records.iter().filter_map(record_id).collect()
}

/// Fetch the dependent-entity chain for one subproject.
///
/// A missing subproject yields the all-empty bundle rather than an error.
pub fn fetch_project_page(store: &Store, subproject_id: i64) -> QueryResult<ProjectPage> {
    let Some(subproject) = get_entity(store, EntityKind::Subproject, subproject_id)? else {
        debug!(subproject_id, "project page requested for missing subproject");
        return Ok(ProjectPage::default());
    };
    let subproject_id = record_id(&subproject).unwrap_or(subproject_id);

    let phases = get_entities(
        store,
        EntityKind::Phase,
        &[Filter::is("subproject", json!(subproject_id))],
    )?;

    let phase_ids = ids_of(&phases);
    let assets = if phase_ids.is_empty() {
        Vec::new()
    } else {
        get_entities(store, EntityKind::Asset, &[in_ids("phase", &phase_ids)])?
    };

    let asset_ids = ids_of(&assets);
    let (tasks, milestone_tasks) = if asset_ids.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        (
            get_entities(store, EntityKind::Task, &[in_ids("asset", &asset_ids)])?,
            get_entities(store, EntityKind::MilestoneTask, &[in_ids("asset", &asset_ids)])?,
        )
    };

    let task_ids = ids_of(&tasks);
    let personworkloads = if task_ids.is_empty() {
        Vec::new()
    } else {
        get_entities(store, EntityKind::PersonWorkload, &[in_ids("task", &task_ids)])?
    };

    let pmmworkloads = get_entities(
        store,
        EntityKind::PmmWorkload,
        &[Filter::is("subproject", json!(subproject_id))],
    )?;

    Ok(ProjectPage { phases, assets, tasks, personworkloads, pmmworkloads, milestone_tasks })
}

/// All subprojects and phases
pub fn fetch_distribute_page(store: &Store) -> QueryResult<DistributePage> {
    Ok(DistributePage {
        subprojects: get_entities(store, EntityKind::Subproject, &[])?,
        phases: get_entities(store, EntityKind::Phase, &[])?,
    })
}

/// People, steps, work categories and the current user
pub fn fetch_basic_data(store: &Store, current_user_id: Option<i64>) -> QueryResult<BasicData> {
    let current_user = match current_user_id {
        Some(id) => get_entity(store, EntityKind::Person, id)?,
        None => None,
    };
    Ok(BasicData {
        person: get_entities(store, EntityKind::Person, &[])?,
        steps: get_entities(store, EntityKind::Step, &[])?,
        work_categories: get_entities(store, EntityKind::WorkCategory, &[])?,
        current_user,
    })
}

/// Tasks whose date range overlaps `[start, end]`, filtered storage-side
pub fn fetch_assignment_tasks(
    store: &Store,
    start: NaiveDate,
    end: NaiveDate,
) -> QueryResult<Vec<Record>> {
    // interval overlap: task.start <= end AND task.end >= start
    get_entities(
        store,
        EntityKind::Task,
        &[
            Filter::cond("start_date", crate::store::CompareOp::Lte, json!(end.to_string())),
            Filter::cond("end_date", crate::store::CompareOp::Gte, json!(start.to_string())),
        ],
    )
}

/// PersonWorkloads whose week falls inside `[start, end]`
pub fn fetch_assignment_workloads(
    store: &Store,
    start: NaiveDate,
    end: NaiveDate,
) -> QueryResult<Vec<Record>> {
    get_entities(
        store,
        EntityKind::PersonWorkload,
        &[
            Filter::cond("week", crate::store::CompareOp::Gte, json!(start.to_string())),
            Filter::cond("week", crate::store::CompareOp::Lte, json!(end.to_string())),
        ],
    )
}

/// The cross-project assignment view for a date window
pub fn fetch_assignment_page(
    store: &Store,
    start: NaiveDate,
    end: NaiveDate,
) -> QueryResult<AssignmentPage> {
    Ok(AssignmentPage {
        tasks: fetch_assignment_tasks(store, start, end)?,
        personworkloads: fetch_assignment_workloads(store, start, end)?,
        person: get_entities(store, EntityKind::Person, &[])?,
    })
}

/// Merge entity lists by id; the last record seen for an id wins, list
/// order follows first appearance
pub fn merge_by_id(lists: &[&[Record]]) -> Vec<Record> {
    let mut order: Vec<i64> = Vec::new();
    let mut merged: HashMap<i64, Record> = HashMap::new();
    for list in lists {
        for record in *list {
            let Some(id) = record_id(record) else {
                continue;
            };
            if !merged.contains_key(&id) {
                order.push(id);
            }
            merged.insert(id, record.clone());
        }
    }
    order.into_iter().filter_map(|id| merged.remove(&id)).collect()
}

/// Startup load: distribute page plus basic data, deduplicated per kind
pub fn init_load(
    store: &Store,
    project_id: Option<i64>,
    person_list: &[i64],
    current_user_id: Option<i64>,
) -> QueryResult<InitLoad> {
    let distribute = fetch_distribute_page(store)?;
    let basic = fetch_basic_data(store, current_user_id)?;

    Ok(InitLoad {
        steps: merge_by_id(&[&basic.steps]),
        subprojects: merge_by_id(&[&distribute.subprojects]),
        phases: merge_by_id(&[&distribute.phases]),
        person: merge_by_id(&[&basic.person]),
        work_categories: merge_by_id(&[&basic.work_categories]),
        selected_subproject_id: project_id,
        selected_person_list: person_list.to_vec(),
        current_user: basic.current_user,
    })
}

/// Membership filter over a parent id set; callers must short-circuit
/// empty sets before reaching this
fn in_ids(field: &str, ids: &[i64]) -> Filter {
    Filter::cond(field, crate::store::CompareOp::In, json!(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use serde_json::json;

    fn data(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    fn create(store: &Store, kind: EntityKind, value: serde_json::Value) -> i64 {
        record_id(&store.create(kind, &data(value), None).unwrap()).unwrap()
    }

    fn seeded() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let person = create(
            &store,
            EntityKind::Person,
            json!({"name": "Mori", "email": "mori@studio.example"}),
        );
        let subproject = create(
            &store,
            EntityKind::Subproject,
            json!({
                "name": "Alpha",
                "start_date": "2024-01-01",
                "end_date": "2024-06-28"
            }),
        );
        let phase = create(
            &store,
            EntityKind::Phase,
            json!({
                "subproject": subproject,
                "name": "DESIGN",
                "start_date": "2024-01-01",
                "end_date": "2024-03-29"
            }),
        );
        let asset = create(
            &store,
            EntityKind::Asset,
            json!({
                "phase": phase,
                "name": "bg_hall",
                "start_date": "2024-01-08",
                "end_date": "2024-02-16"
            }),
        );
        let task = create(
            &store,
            EntityKind::Task,
            json!({
                "asset": asset,
                "name": "modeling",
                "start_date": "2024-01-08",
                "end_date": "2024-01-19",
                "assignees": [person]
            }),
        );
        create(
            &store,
            EntityKind::PersonWorkload,
            json!({
                "task": task,
                "person": person,
                "name": "modeling",
                "week": "2024-01-08",
                "man_week": 0.5
            }),
        );
        create(
            &store,
            EntityKind::PmmWorkload,
            json!({
                "subproject": subproject,
                "name": "design budget",
                "week": "2024-01-08",
                "man_week": 2.0
            }),
        );
        (store, subproject)
    }

    #[test]
    fn test_project_page_walks_the_dependent_chain() {
        let (store, subproject) = seeded();
        let page = fetch_project_page(&store, subproject).unwrap();
        assert_eq!(page.phases.len(), 1);
        assert_eq!(page.assets.len(), 1);
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.personworkloads.len(), 1);
        assert_eq!(page.pmmworkloads.len(), 1);
        assert!(page.milestone_tasks.is_empty());

        // composite keys are flattened for the UI
        let task = &page.tasks[0];
        assert!(task.contains_key("subproject"));
        assert!(!task.contains_key("asset.phase.subproject"));
        let workload = &page.personworkloads[0];
        assert!(workload.contains_key("subproject"));
    }

    #[test]
    fn test_missing_subproject_degrades_to_empty_bundle() {
        let (store, _) = seeded();
        let page = fetch_project_page(&store, 9999).unwrap();
        assert!(page.phases.is_empty());
        assert!(page.assets.is_empty());
        assert!(page.tasks.is_empty());
        assert!(page.personworkloads.is_empty());
        assert!(page.pmmworkloads.is_empty());
        assert!(page.milestone_tasks.is_empty());
    }

    #[test]
    fn test_subproject_without_phases_short_circuits() {
        let store = Store::open_in_memory().unwrap();
        let empty = create(
            &store,
            EntityKind::Subproject,
            json!({
                "name": "Empty",
                "start_date": "2024-01-01",
                "end_date": "2024-02-01"
            }),
        );
        let page = fetch_project_page(&store, empty).unwrap();
        assert!(page.assets.is_empty());
        assert!(page.tasks.is_empty());
    }

    #[test]
    fn test_assignment_window_uses_interval_overlap() {
        let (store, _) = seeded();
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();

        // task runs 2024-01-08..2024-01-19
        let hit = fetch_assignment_tasks(&store, d("2024-01-15"), d("2024-01-22")).unwrap();
        assert_eq!(hit.len(), 1);

        let miss = fetch_assignment_tasks(&store, d("2024-01-20"), d("2024-01-22")).unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn test_assignment_workloads_filter_by_week() {
        let (store, _) = seeded();
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let hit = fetch_assignment_workloads(&store, d("2024-01-08"), d("2024-01-14")).unwrap();
        assert_eq!(hit.len(), 1);
        let miss = fetch_assignment_workloads(&store, d("2024-02-05"), d("2024-02-11")).unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn test_merge_by_id_later_list_wins() {
        let a = vec![[("id", Value::Int(1)), ("v", Value::Text("a".to_string()))]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Record>()];
        let b = vec![
            [("id", Value::Int(1)), ("v", Value::Text("b".to_string()))]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<Record>(),
            [("id", Value::Int(2)), ("v", Value::Text("c".to_string()))]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<Record>(),
        ];
        let merged = merge_by_id(&[&a, &b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(merged[0].get("v"), Some(&Value::Text("b".to_string())));
        assert_eq!(merged[1].get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_init_load_carries_selection_and_user() {
        let (store, subproject) = seeded();
        let people = get_entities(&store, EntityKind::Person, &[]).unwrap();
        let user = record_id(&people[0]).unwrap();
        let snapshot = init_load(&store, Some(subproject), &[user], Some(user)).unwrap();
        assert_eq!(snapshot.selected_subproject_id, Some(subproject));
        assert_eq!(snapshot.selected_person_list, vec![user]);
        assert!(snapshot.current_user.is_some());
        assert_eq!(snapshot.subprojects.len(), 1);
    }
}
