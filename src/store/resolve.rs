//! Row serialization and dotted-path resolution
//!
//! Turns stored rows into link-normalized records: scalar columns become
//! typed [`Value`]s, to-one references become `{type, id, name}` links and
//! to-many edges become link lists in storage iteration order. Dotted
//! paths walk the schema graph edge by edge and fail closed - a null
//! intermediate, an unknown segment or a to-many edge mid-path all resolve
//! to `Value::Null` rather than an error.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension};

use crate::core::error::{QueryError, QueryResult};
use crate::core::schema::{EntityKind, FieldDef, FieldType};
use crate::core::value::{Link, Record, Value, DATETIME_FORMAT};

use super::Store;

type SqlValue = rusqlite::types::Value;

impl Store {
    /// Load the direct columns of one row, keyed by field name
    pub(crate) fn load_row(
        &self,
        kind: EntityKind,
        id: i64,
    ) -> QueryResult<Option<HashMap<&'static str, SqlValue>>> {
        let schema = kind.schema();
        let direct: Vec<&FieldDef> = schema
            .fields
            .iter()
            .filter(|f| !matches!(f.ty, FieldType::ToMany { .. }))
            .collect();
        let columns: Vec<&str> = direct.iter().map(|f| f.column).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            columns.join(", "),
            schema.table
        );

        let row = self
            .conn
            .query_row(&sql, params![id], |row| {
                let mut map = HashMap::with_capacity(direct.len());
                for (index, field) in direct.iter().enumerate() {
                    map.insert(field.name, row.get::<_, SqlValue>(index)?);
                }
                Ok(map)
            })
            .optional()?;
        Ok(row)
    }

    /// Does a row of this kind exist?
    pub(crate) fn exists(&self, kind: EntityKind, id: i64) -> QueryResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", kind.schema().table);
        let found: Option<i64> =
            self.conn.query_row(&sql, params![id], |row| row.get(0)).optional()?;
        Ok(found.is_some())
    }

    /// Build the link dict for a referenced row.
    ///
    /// Falls back to a generic stringification if the target row is gone
    /// (dangling references cannot normally happen with foreign keys on).
    pub(crate) fn link_for(&self, kind: EntityKind, id: i64) -> QueryResult<Link> {
        let schema = kind.schema();
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", schema.label, schema.table);
        let name: Option<String> =
            self.conn.query_row(&sql, params![id], |row| row.get(0)).optional()?;
        Ok(Link::new(kind, id, name.unwrap_or_else(|| format!("{} {}", kind, id))))
    }

    /// Links for a to-many edge, in storage iteration order
    pub(crate) fn many_links(&self, id: i64, field: &FieldDef) -> QueryResult<Vec<Link>> {
        let FieldType::ToMany { target, join_table, own_col, target_col } = field.ty else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {target_col} FROM {join_table} WHERE {own_col} = ?1 ORDER BY rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids: Vec<i64> =
            stmt.query_map(params![id], |row| row.get(0))?.collect::<Result<_, _>>()?;
        ids.into_iter().map(|target_id| self.link_for(target, target_id)).collect()
    }

    /// Format one declared field of a loaded row
    pub(crate) fn field_value(
        &self,
        id: i64,
        field: &'static FieldDef,
        row: &HashMap<&'static str, SqlValue>,
    ) -> QueryResult<Value> {
        match field.ty {
            FieldType::ToMany { .. } => Ok(Value::LinkList(self.many_links(id, field)?)),
            FieldType::ToOne(target) => match row.get(field.name) {
                Some(SqlValue::Integer(fk)) => Ok(Value::Link(self.link_for(target, *fk)?)),
                _ => Ok(Value::Null),
            },
            _ => scalar_value(field, row.get(field.name)),
        }
    }

    /// Resolve a dot-separated attribute path starting from one entity.
    ///
    /// Mid-path segments must be to-one edges; the terminal segment may be
    /// any field. Traversal fails closed to `Value::Null`.
    pub fn resolve_path(&self, kind: EntityKind, id: i64, path: &str) -> QueryResult<Value> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut kind = kind;
        let mut current: Option<i64> = Some(id);

        for (index, segment) in segments.iter().enumerate() {
            let Some(id) = current else {
                return Ok(Value::Null);
            };
            let last = index == segments.len() - 1;
            if last && *segment == "id" {
                return Ok(Value::Int(id));
            }
            let schema = kind.schema();
            let Some(field) = schema.field(segment) else {
                return Ok(Value::Null);
            };

            if last {
                let Some(row) = self.load_row(kind, id)? else {
                    return Ok(Value::Null);
                };
                return self.field_value(id, field, &row);
            }

            match field.ty {
                FieldType::ToOne(target) => {
                    let sql = format!(
                        "SELECT {} FROM {} WHERE id = ?1",
                        field.column, schema.table
                    );
                    let fk: Option<Option<i64>> = self
                        .conn
                        .query_row(&sql, params![id], |row| row.get(0))
                        .optional()?;
                    current = fk.flatten();
                    kind = target;
                }
                // to-many fan-out and scalars are not traversable mid-path
                _ => return Ok(Value::Null),
            }
        }

        Ok(Value::Null)
    }

    /// Serialize one entity into a record.
    ///
    /// `id` and `type` are always present. With an explicit field list,
    /// exactly those keys appear; a field absent from this row still shows
    /// up as `Null` so every row of a result set has the same shape. With
    /// no field list, every direct attribute and to-many edge is included.
    pub(crate) fn serialize_record(
        &self,
        kind: EntityKind,
        id: i64,
        fields: Option<&[String]>,
    ) -> QueryResult<Option<Record>> {
        let Some(row) = self.load_row(kind, id)? else {
            return Ok(None);
        };
        let schema = kind.schema();

        let mut record = Record::new();
        record.insert("id".to_string(), Value::Int(id));
        record.insert("type".to_string(), Value::Text(kind.as_str().to_string()));

        match fields {
            Some(requested) => {
                for name in requested {
                    if name == "id" || name == "type" {
                        continue;
                    }
                    let value = if name.contains('.') {
                        self.resolve_path(kind, id, name)?
                    } else if let Some(field) = schema.field(name) {
                        self.field_value(id, field, &row)?
                    } else {
                        Value::Null
                    };
                    record.insert(name.clone(), value);
                }
            }
            None => {
                for field in schema.fields {
                    record.insert(field.name.to_string(), self.field_value(id, field, &row)?);
                }
            }
        }

        Ok(Some(record))
    }
}

fn scalar_value(field: &FieldDef, raw: Option<&SqlValue>) -> QueryResult<Value> {
    let raw = match raw {
        None | Some(SqlValue::Null) => return Ok(Value::Null),
        Some(v) => v,
    };
    match field.ty {
        FieldType::Bool => match raw {
            SqlValue::Integer(i) => Ok(Value::Bool(*i != 0)),
            other => Err(malformed(field, other)),
        },
        FieldType::Int => match raw {
            SqlValue::Integer(i) => Ok(Value::Int(*i)),
            other => Err(malformed(field, other)),
        },
        FieldType::Decimal => match raw {
            SqlValue::Real(f) => Ok(Value::Float(*f)),
            SqlValue::Integer(i) => Ok(Value::Float(*i as f64)),
            other => Err(malformed(field, other)),
        },
        FieldType::Text => match raw {
            SqlValue::Text(s) => Ok(Value::Text(s.clone())),
            other => Err(malformed(field, other)),
        },
        FieldType::Date => match raw {
            SqlValue::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| malformed(field, raw)),
            other => Err(malformed(field, other)),
        },
        FieldType::DateTime => match raw {
            SqlValue::Text(s) => parse_datetime(s)
                .map(Value::DateTime)
                .ok_or_else(|| malformed(field, raw)),
            other => Err(malformed(field, other)),
        },
        FieldType::ToOne(_) | FieldType::ToMany { .. } => {
            // handled in field_value
            Ok(Value::Null)
        }
    }
}

/// Parse a stored timestamp, accepting the ISO "T" separator as well
pub(crate) fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn malformed(field: &FieldDef, raw: &SqlValue) -> QueryError {
    QueryError::Validation(format!(
        "stored value {:?} does not match declared type {:?} of column '{}'",
        raw, field.ty, field.column
    ))
}
