//! Entity kinds and the static relationship schema
//!
//! Every entity kind the engine can serve is declared here as a
//! compile-time table: its SQL table, its label column (used for link
//! display names) and its field list, including to-one and to-many edges.
//! The dotted-path resolver and the filter compiler walk these tables by
//! explicit edge lookups - there is no runtime reflection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::QueryError;

/// The entity kinds of the production-tracking hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Department,
    Step,
    Person,
    WorkCategory,
    Subproject,
    Phase,
    Asset,
    Task,
    MilestoneTask,
    PersonWorkload,
    PmmWorkload,
}

/// Declared type of a single entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Text,
    Bool,
    Date,
    DateTime,
    Decimal,
    /// Foreign key to another entity kind
    ToOne(EntityKind),
    /// Many-to-many edge through a join table
    ToMany {
        target: EntityKind,
        join_table: &'static str,
        own_col: &'static str,
        target_col: &'static str,
    },
}

/// One field of an entity schema
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    /// Field name as seen by callers (e.g. "phase")
    pub name: &'static str,
    /// Backing SQL column ("phase_id" for to-one edges, empty for to-many)
    pub column: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
}

/// Static schema for one entity kind
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Column used as the display name in link dicts
    pub label: &'static str,
    pub fields: &'static [FieldDef],
}

impl EntitySchema {
    /// Look up a field by its caller-facing name
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const DEPARTMENT_FIELDS: &[FieldDef] = &[
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "description", column: "description", ty: FieldType::Text, nullable: true },
];

const STEP_FIELDS: &[FieldDef] = &[
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "color", column: "color", ty: FieldType::Text, nullable: false },
];

const PERSON_FIELDS: &[FieldDef] = &[
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "email", column: "email", ty: FieldType::Text, nullable: true },
    FieldDef {
        name: "department",
        column: "department_id",
        ty: FieldType::ToOne(EntityKind::Department),
        nullable: true,
    },
    FieldDef {
        name: "manager",
        column: "manager_id",
        ty: FieldType::ToOne(EntityKind::Person),
        nullable: true,
    },
    FieldDef {
        name: "subproject",
        column: "",
        ty: FieldType::ToMany {
            target: EntityKind::Subproject,
            join_table: "person_subprojects",
            own_col: "person_id",
            target_col: "subproject_id",
        },
        nullable: true,
    },
];

const WORK_CATEGORY_FIELDS: &[FieldDef] = &[
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "description", column: "description", ty: FieldType::Text, nullable: true },
];

const SUBPROJECT_FIELDS: &[FieldDef] = &[
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "start_date", column: "start_date", ty: FieldType::Date, nullable: false },
    FieldDef { name: "end_date", column: "end_date", ty: FieldType::Date, nullable: false },
    FieldDef {
        name: "editing",
        column: "editing_id",
        ty: FieldType::ToOne(EntityKind::Person),
        nullable: true,
    },
    FieldDef { name: "last_edit", column: "last_edit", ty: FieldType::DateTime, nullable: true },
    FieldDef {
        name: "department",
        column: "department_id",
        ty: FieldType::ToOne(EntityKind::Department),
        nullable: true,
    },
    FieldDef { name: "access", column: "access", ty: FieldType::Text, nullable: false },
    FieldDef { name: "pmm_status", column: "pmm_status", ty: FieldType::Text, nullable: false },
];

const PHASE_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "subproject",
        column: "subproject_id",
        ty: FieldType::ToOne(EntityKind::Subproject),
        nullable: false,
    },
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "start_date", column: "start_date", ty: FieldType::Date, nullable: false },
    FieldDef { name: "end_date", column: "end_date", ty: FieldType::Date, nullable: false },
    FieldDef { name: "milestone", column: "milestone", ty: FieldType::Bool, nullable: false },
    FieldDef { name: "phase_type", column: "phase_type", ty: FieldType::Text, nullable: false },
];

const ASSET_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "phase",
        column: "phase_id",
        ty: FieldType::ToOne(EntityKind::Phase),
        nullable: false,
    },
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "start_date", column: "start_date", ty: FieldType::Date, nullable: false },
    FieldDef { name: "end_date", column: "end_date", ty: FieldType::Date, nullable: false },
    FieldDef { name: "asset_type", column: "asset_type", ty: FieldType::Text, nullable: false },
    FieldDef {
        name: "work_category",
        column: "work_category_id",
        ty: FieldType::ToOne(EntityKind::WorkCategory),
        nullable: true,
    },
    FieldDef {
        name: "step",
        column: "step_id",
        ty: FieldType::ToOne(EntityKind::Step),
        nullable: true,
    },
];

const TASK_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "asset",
        column: "asset_id",
        ty: FieldType::ToOne(EntityKind::Asset),
        nullable: false,
    },
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "start_date", column: "start_date", ty: FieldType::Date, nullable: false },
    FieldDef { name: "end_date", column: "end_date", ty: FieldType::Date, nullable: false },
    FieldDef {
        name: "assignees",
        column: "",
        ty: FieldType::ToMany {
            target: EntityKind::Person,
            join_table: "task_assignees",
            own_col: "task_id",
            target_col: "person_id",
        },
        nullable: true,
    },
    FieldDef { name: "status", column: "status", ty: FieldType::Text, nullable: false },
];

const MILESTONE_TASK_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "asset",
        column: "asset_id",
        ty: FieldType::ToOne(EntityKind::Asset),
        nullable: false,
    },
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "start_date", column: "start_date", ty: FieldType::Date, nullable: false },
    FieldDef { name: "end_date", column: "end_date", ty: FieldType::Date, nullable: false },
    FieldDef {
        name: "milestone_type",
        column: "milestone_type",
        ty: FieldType::Text,
        nullable: false,
    },
];

const PERSON_WORKLOAD_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "task",
        column: "task_id",
        ty: FieldType::ToOne(EntityKind::Task),
        nullable: false,
    },
    FieldDef {
        name: "person",
        column: "person_id",
        ty: FieldType::ToOne(EntityKind::Person),
        nullable: false,
    },
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "week", column: "week", ty: FieldType::Date, nullable: false },
    FieldDef { name: "man_week", column: "man_week", ty: FieldType::Decimal, nullable: false },
];

const PMM_WORKLOAD_FIELDS: &[FieldDef] = &[
    FieldDef {
        name: "subproject",
        column: "subproject_id",
        ty: FieldType::ToOne(EntityKind::Subproject),
        nullable: false,
    },
    FieldDef {
        name: "work_category",
        column: "work_category_id",
        ty: FieldType::ToOne(EntityKind::WorkCategory),
        nullable: true,
    },
    FieldDef { name: "name", column: "name", ty: FieldType::Text, nullable: false },
    FieldDef { name: "week", column: "week", ty: FieldType::Date, nullable: false },
    FieldDef { name: "man_week", column: "man_week", ty: FieldType::Decimal, nullable: false },
];

static SCHEMAS: &[EntitySchema] = &[
    EntitySchema {
        kind: EntityKind::Department,
        table: "departments",
        label: "name",
        fields: DEPARTMENT_FIELDS,
    },
    EntitySchema { kind: EntityKind::Step, table: "steps", label: "name", fields: STEP_FIELDS },
    EntitySchema { kind: EntityKind::Person, table: "people", label: "name", fields: PERSON_FIELDS },
    EntitySchema {
        kind: EntityKind::WorkCategory,
        table: "work_categories",
        label: "name",
        fields: WORK_CATEGORY_FIELDS,
    },
    EntitySchema {
        kind: EntityKind::Subproject,
        table: "subprojects",
        label: "name",
        fields: SUBPROJECT_FIELDS,
    },
    EntitySchema { kind: EntityKind::Phase, table: "phases", label: "name", fields: PHASE_FIELDS },
    EntitySchema { kind: EntityKind::Asset, table: "assets", label: "name", fields: ASSET_FIELDS },
    EntitySchema { kind: EntityKind::Task, table: "tasks", label: "name", fields: TASK_FIELDS },
    EntitySchema {
        kind: EntityKind::MilestoneTask,
        table: "milestone_tasks",
        label: "name",
        fields: MILESTONE_TASK_FIELDS,
    },
    EntitySchema {
        kind: EntityKind::PersonWorkload,
        table: "person_workloads",
        label: "name",
        fields: PERSON_WORKLOAD_FIELDS,
    },
    EntitySchema {
        kind: EntityKind::PmmWorkload,
        table: "pmm_workloads",
        label: "name",
        fields: PMM_WORKLOAD_FIELDS,
    },
];

impl EntityKind {
    /// Wire name of the kind, as used in `type` fields and link dicts
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Department => "Department",
            EntityKind::Step => "Step",
            EntityKind::Person => "Person",
            EntityKind::WorkCategory => "WorkCategory",
            EntityKind::Subproject => "Subproject",
            EntityKind::Phase => "Phase",
            EntityKind::Asset => "Asset",
            EntityKind::Task => "Task",
            EntityKind::MilestoneTask => "MilestoneTask",
            EntityKind::PersonWorkload => "PersonWorkload",
            EntityKind::PmmWorkload => "PMMWorkload",
        }
    }

    /// All declared kinds
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Department,
            EntityKind::Step,
            EntityKind::Person,
            EntityKind::WorkCategory,
            EntityKind::Subproject,
            EntityKind::Phase,
            EntityKind::Asset,
            EntityKind::Task,
            EntityKind::MilestoneTask,
            EntityKind::PersonWorkload,
            EntityKind::PmmWorkload,
        ]
    }

    /// Resolve a caller-supplied entity type name, case-insensitively
    pub fn from_name(name: &str) -> Result<Self, QueryError> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))
    }

    /// The static schema for this kind
    pub fn schema(&self) -> &'static EntitySchema {
        // SCHEMAS is declared in `all()` order; keep the two lists in sync.
        &SCHEMAS[*self as usize]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl Serialize for EntityKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_name(&s).map_err(serde::de::Error::custom)
    }
}

/// Check the declared schema tables for internal consistency.
///
/// Runs once when a [`crate::store::Store`] is opened. Everything here is
/// static data, so a failure is a programming error in this module, but
/// checking at startup beats debugging a malformed SQL statement later.
pub fn validate() -> Result<(), String> {
    for (index, schema) in SCHEMAS.iter().enumerate() {
        if schema.kind as usize != index {
            return Err(format!("schema table out of order at '{}'", schema.kind));
        }
        if schema.field(schema.label).is_none() {
            return Err(format!(
                "label column '{}' is not a declared field of {}",
                schema.label, schema.kind
            ));
        }
        for field in schema.fields {
            match field.ty {
                FieldType::ToOne(_) => {
                    if !field.column.ends_with("_id") {
                        return Err(format!(
                            "to-one field {}.{} must be backed by an *_id column, got '{}'",
                            schema.kind, field.name, field.column
                        ));
                    }
                }
                FieldType::ToMany { join_table, own_col, target_col, .. } => {
                    if !field.column.is_empty() {
                        return Err(format!(
                            "to-many field {}.{} must not declare a direct column",
                            schema.kind, field.name
                        ));
                    }
                    if join_table.is_empty() || own_col.is_empty() || target_col.is_empty() {
                        return Err(format!(
                            "to-many field {}.{} has an incomplete join declaration",
                            schema.kind, field.name
                        ));
                    }
                }
                _ => {
                    if field.column.is_empty() {
                        return Err(format!(
                            "field {}.{} has no backing column",
                            schema.kind, field.name
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}
