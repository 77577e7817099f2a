//! Field remapping for cross-entity composite keys
//!
//! Projections across relationships produce dotted keys like
//! `asset.phase.subproject`, but downstream consumers expect the flat name
//! of the nearest conceptual ancestor (`subproject`). The rule table is a
//! compile-time constant keyed by entity kind; which rules apply to a
//! record is decided by its injected `type` field.

use crate::core::schema::EntityKind;
use crate::core::value::{record_kind, Record, Value, DATETIME_FORMAT, DATE_FORMAT};

/// One rename rule: copy `old` to `new`, then drop `old`
#[derive(Debug, Clone, Copy)]
pub struct RemapRule {
    pub kind: EntityKind,
    pub old: &'static str,
    pub new: &'static str,
}

/// The per-kind remap rules; kinds not listed pass through unchanged
pub const REMAP_RULES: &[RemapRule] = &[
    RemapRule { kind: EntityKind::Asset, old: "step.color", new: "color" },
    RemapRule { kind: EntityKind::Task, old: "asset.phase.subproject", new: "subproject" },
    RemapRule { kind: EntityKind::Task, old: "asset.work_category", new: "work_category" },
    RemapRule {
        kind: EntityKind::MilestoneTask,
        old: "asset.phase.subproject",
        new: "subproject",
    },
    RemapRule { kind: EntityKind::MilestoneTask, old: "asset.asset_type", new: "asset_type" },
    RemapRule {
        kind: EntityKind::PersonWorkload,
        old: "task.asset.phase.subproject",
        new: "subproject",
    },
];

/// Behavior switches for [`remap_key`]
#[derive(Debug, Clone, Copy)]
pub struct RemapOptions {
    /// Overwrite `new` when it already exists
    pub override_existing: bool,
    /// Keep `old` instead of removing it
    pub keep_old: bool,
}

impl Default for RemapOptions {
    fn default() -> Self {
        Self { override_existing: false, keep_old: false }
    }
}

/// Apply one rename rule to a single record
pub fn remap_key(record: &mut Record, old_key: &str, new_key: &str, opts: RemapOptions) {
    if !record.contains_key(old_key) {
        return;
    }
    if opts.override_existing || !record.contains_key(new_key) {
        if let Some(value) = record.get(old_key).cloned() {
            record.insert(new_key.to_string(), value);
        }
    }
    if !opts.keep_old {
        record.remove(old_key);
    }
}

/// Apply one rename rule to every record of a list
pub fn remap_key_in_list(records: &mut [Record], old_key: &str, new_key: &str) {
    for record in records {
        remap_key(record, old_key, new_key, RemapOptions::default());
    }
}

/// Apply the registered rules for a record's kind, plus the universal
/// `update_at` display pass
pub fn adjust_one(record: &mut Record) {
    if let Some(kind) = record_kind(record) {
        for rule in REMAP_RULES.iter().filter(|r| r.kind == kind) {
            remap_key(record, rule.old, rule.new, RemapOptions::default());
        }
    }
    stringify_update_at(record);
}

/// Adjust every record of a list
pub fn adjust(records: &mut [Record]) {
    for record in records {
        adjust_one(record);
    }
}

/// `update_at` timestamps are always shipped as display strings
fn stringify_update_at(record: &mut Record) {
    let formatted = match record.get("update_at") {
        Some(Value::DateTime(dt)) => Some(dt.format(DATETIME_FORMAT).to_string()),
        Some(Value::Date(d)) => Some(d.format(DATE_FORMAT).to_string()),
        _ => None,
    };
    if let Some(text) = formatted {
        record.insert("update_at".to_string(), Value::Text(text));
    }
}
