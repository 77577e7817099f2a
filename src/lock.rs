//! Optimistic edit lock on Subprojects
//!
//! Two UI sessions must not edit the same Subproject at once. The lock is
//! the entity's own `editing` reference plus the `last_edit` timestamp: a
//! holder refreshes `last_edit` while editing, and a lock whose timestamp
//! is older than five minutes is treated as abandoned. Non-blocking - a
//! caller who fails to acquire retries later or presents a read-only view.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::core::error::{QueryError, QueryResult};
use crate::core::schema::EntityKind;
use crate::core::value::{Link, Record, Value, DATETIME_FORMAT};
use crate::store::Store;

/// A lock older than this is treated as abandoned
pub const LOCK_TIMEOUT_SECS: i64 = 5 * 60;

/// Outcome of a lock call, serialized as `{success, editingUser?, last_edit?}`
#[derive(Debug, Clone, Serialize)]
pub struct LockResponse {
    pub success: bool,
    #[serde(rename = "editingUser", skip_serializing_if = "Option::is_none")]
    pub editing_user: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edit: Option<String>,
}

impl LockResponse {
    fn granted() -> Self {
        Self { success: true, editing_user: None, last_edit: None }
    }

    fn denied(editing_user: Option<Link>, last_edit: Option<NaiveDateTime>) -> Self {
        Self {
            success: false,
            editing_user,
            last_edit: last_edit.map(|ts| ts.format(DATETIME_FORMAT).to_string()),
        }
    }
}

/// Current lock fields of one Subproject
struct LockState {
    editing: Option<Link>,
    last_edit: Option<NaiveDateTime>,
}

fn load_state(store: &Store, subproject_id: i64) -> QueryResult<LockState> {
    let fields = vec!["editing".to_string(), "last_edit".to_string()];
    let record: Record = store
        .find_one(EntityKind::Subproject, subproject_id, Some(&fields))?
        .ok_or(QueryError::NotFound { kind: EntityKind::Subproject, id: subproject_id })?;
    let editing = match record.get("editing") {
        Some(Value::Link(link)) => Some(link.clone()),
        _ => None,
    };
    let last_edit = match record.get("last_edit") {
        Some(Value::DateTime(ts)) => Some(*ts),
        _ => None,
    };
    Ok(LockState { editing, last_edit })
}

fn write_holder(
    store: &Store,
    subproject_id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> QueryResult<()> {
    let mut data = serde_json::Map::new();
    data.insert("editing".to_string(), json!({"type": "Person", "id": user_id}));
    data.insert("last_edit".to_string(), json!(now.format(DATETIME_FORMAT).to_string()));
    store.update(EntityKind::Subproject, subproject_id, &data)?;
    Ok(())
}

/// Try to take the edit lock, reporting the holder on failure
pub fn acquire(store: &Store, subproject_id: i64, user_id: i64) -> QueryResult<LockResponse> {
    acquire_at(store, subproject_id, user_id, Local::now().naive_local())
}

/// [`acquire`] with an explicit clock
pub fn acquire_at(
    store: &Store,
    subproject_id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> QueryResult<LockResponse> {
    let state = load_state(store, subproject_id)?;

    let free = match (&state.editing, state.last_edit) {
        (None, _) => true,
        (Some(holder), _) if holder.id == user_id => true,
        (_, None) => true,
        (_, Some(last_edit)) => {
            now.signed_duration_since(last_edit).num_seconds() > LOCK_TIMEOUT_SECS
        }
    };

    if free {
        write_holder(store, subproject_id, user_id, now)?;
        debug!(subproject_id, user_id, "edit lock acquired");
        Ok(LockResponse::granted())
    } else {
        debug!(subproject_id, user_id, "edit lock denied");
        Ok(LockResponse::denied(state.editing, state.last_edit))
    }
}

/// Refresh the lock timestamp; a no-op failure for anyone but the holder
pub fn heartbeat(store: &Store, subproject_id: i64, user_id: i64) -> QueryResult<LockResponse> {
    heartbeat_at(store, subproject_id, user_id, Local::now().naive_local())
}

/// [`heartbeat`] with an explicit clock
pub fn heartbeat_at(
    store: &Store,
    subproject_id: i64,
    user_id: i64,
    now: NaiveDateTime,
) -> QueryResult<LockResponse> {
    let state = load_state(store, subproject_id)?;
    match state.editing {
        Some(holder) if holder.id == user_id => {
            let mut data = serde_json::Map::new();
            data.insert(
                "last_edit".to_string(),
                json!(now.format(DATETIME_FORMAT).to_string()),
            );
            store.update(EntityKind::Subproject, subproject_id, &data)?;
            Ok(LockResponse::granted())
        }
        _ => Ok(LockResponse::denied(None, None)),
    }
}

/// Clear the lock if held by this user
pub fn release(store: &Store, subproject_id: i64, user_id: i64) -> QueryResult<LockResponse> {
    let state = load_state(store, subproject_id)?;
    match state.editing {
        Some(holder) if holder.id == user_id => {
            let mut data = serde_json::Map::new();
            data.insert("editing".to_string(), serde_json::Value::Null);
            data.insert("last_edit".to_string(), serde_json::Value::Null);
            store.update(EntityKind::Subproject, subproject_id, &data)?;
            debug!(subproject_id, user_id, "edit lock released");
            Ok(LockResponse::granted())
        }
        _ => Ok(LockResponse::denied(None, None)),
    }
}
