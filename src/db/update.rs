//! Partial-update statement builder.
//!
//! Callers declare the patchable fields of an entity in a fixed order and
//! pass `None` for anything they want left alone. Only supplied fields make
//! it into the `SET` list, and `updated_at` is refreshed whenever at least
//! one field is supplied.

use std::error::Error;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};
use uuid::Uuid;

use crate::types::EntityId;

/// Column refreshed on every effective update.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Tagged value for one patched column.
///
/// The set is closed: every kind knows how to encode itself for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Float(f64),
    Timestamp(DateTime<Utc>),
    /// Enum label, bound to a PostgreSQL enum or text column.
    Enum(&'static str),
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

/// Positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Value(FieldValue),
    /// Primary key; binds to `uuid` or text id columns.
    Key(String),
}

impl ToSql for SqlParam {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Self::Value(FieldValue::Text(v)) => v.to_sql_checked(ty, out),
            Self::Value(FieldValue::Bool(v)) => v.to_sql_checked(ty, out),
            Self::Value(FieldValue::Float(v)) if *ty == Type::NUMERIC => {
                Decimal::try_from(*v)?.to_sql_checked(ty, out)
            }
            Self::Value(FieldValue::Float(v)) => v.to_sql_checked(ty, out),
            Self::Value(FieldValue::Timestamp(v)) if *ty == Type::TIMESTAMP => {
                v.naive_utc().to_sql_checked(ty, out)
            }
            Self::Value(FieldValue::Timestamp(v)) => v.to_sql_checked(ty, out),
            Self::Value(FieldValue::Enum(label)) if matches!(ty.kind(), Kind::Enum(_)) => {
                out.extend_from_slice(label.as_bytes());
                Ok(IsNull::No)
            }
            Self::Value(FieldValue::Enum(label)) => label.to_sql_checked(ty, out),
            Self::Key(id) if *ty == Type::UUID => Uuid::parse_str(id)?.to_sql_checked(ty, out),
            Self::Key(id) => id.to_sql_checked(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        // Value-level compatibility is checked per variant in `to_sql`.
        matches!(ty.kind(), Kind::Enum(_))
            || <String as ToSql>::accepts(ty)
            || <bool as ToSql>::accepts(ty)
            || <f64 as ToSql>::accepts(ty)
            || <DateTime<Utc> as ToSql>::accepts(ty)
            || *ty == Type::TIMESTAMP
            || *ty == Type::NUMERIC
            || *ty == Type::UUID
    }

    to_sql_checked!();
}

/// A ready-to-run `UPDATE ... RETURNING` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl UpdateStatement {
    /// Parameters in the shape `tokio-postgres` expects.
    pub fn bind(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect()
    }
}

/// Result of building an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePlan {
    Statement(UpdateStatement),
    /// No field was supplied; nothing should be sent to the store.
    NoOp,
}

impl UpdatePlan {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

/// Builder for partial `UPDATE` statements.
///
/// Clause order is the order of `set` calls, so the same input always
/// produces the same SQL.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: &'static str,
    returning: Option<&'static [&'static str]>,
    fields: Vec<(&'static str, FieldValue)>,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            returning: None,
            fields: Vec::new(),
        }
    }

    /// Columns to return; `RETURNING *` when unset.
    pub fn returning(mut self, columns: &'static [&'static str]) -> Self {
        self.returning = Some(columns);
        self
    }

    /// Patch `column` if `value` is present; `None` leaves it untouched.
    pub fn set<V: Into<FieldValue>>(mut self, column: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.fields.push((column, value.into()));
        }
        self
    }

    /// Build the statement for row `id`, stamping `updated_at` with now.
    pub fn build(self, id: &EntityId) -> UpdatePlan {
        self.build_at(id, Utc::now())
    }

    /// Build the statement for row `id`, stamping `updated_at` with `now`.
    pub fn build_at(self, id: &EntityId, now: DateTime<Utc>) -> UpdatePlan {
        if self.fields.is_empty() {
            return UpdatePlan::NoOp;
        }

        let mut clauses = Vec::with_capacity(self.fields.len() + 1);
        let mut params = Vec::with_capacity(self.fields.len() + 2);

        for (column, value) in self.fields {
            params.push(SqlParam::Value(value));
            clauses.push(format!("{} = ${}", column, params.len()));
        }

        params.push(SqlParam::Value(FieldValue::Timestamp(now)));
        clauses.push(format!("{} = ${}", UPDATED_AT_COLUMN, params.len()));

        params.push(SqlParam::Key(id.as_str().to_string()));
        let returning = self
            .returning
            .map(|cols| cols.join(", "))
            .unwrap_or_else(|| "*".to_string());

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ${} RETURNING {}",
            self.table,
            clauses.join(", "),
            params.len(),
            returning
        );

        UpdatePlan::Statement(UpdateStatement { sql, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn id() -> EntityId {
        EntityId::new("0b7c1d2e-0000-4000-8000-000000000001")
    }

    fn statement(plan: UpdatePlan) -> UpdateStatement {
        match plan {
            UpdatePlan::Statement(s) => s,
            UpdatePlan::NoOp => panic!("expected a statement"),
        }
    }

    #[test]
    fn test_only_supplied_fields_are_set() {
        let plan = UpdateBuilder::new("users")
            .set("first_name", Some("Jane"))
            .set::<String>("last_name", None)
            .build_at(&id(), now());

        let stmt = statement(plan);
        assert_eq!(
            stmt.sql,
            "UPDATE users SET first_name = $1, updated_at = $2 WHERE id = $3 RETURNING *"
        );
        assert!(!stmt.sql.contains("last_name"));
        assert_eq!(
            stmt.params,
            vec![
                SqlParam::Value(FieldValue::Text("Jane".to_string())),
                SqlParam::Value(FieldValue::Timestamp(now())),
                SqlParam::Key(id().into_inner()),
            ]
        );
    }

    #[test]
    fn test_empty_update_is_noop() {
        let plan = UpdateBuilder::new("users")
            .set::<String>("first_name", None)
            .set::<String>("last_name", None)
            .build_at(&id(), now());
        assert!(plan.is_noop());

        assert!(UpdateBuilder::new("users").build(&id()).is_noop());
    }

    #[test]
    fn test_empty_string_is_applied() {
        let stmt = statement(
            UpdateBuilder::new("licenses")
                .set("notes", Some(String::new()))
                .build_at(&id(), now()),
        );
        assert_eq!(
            stmt.params[0],
            SqlParam::Value(FieldValue::Text(String::new()))
        );
    }

    #[test]
    fn test_clause_order_follows_declaration() {
        let build = || {
            UpdateBuilder::new("licenses")
                .returning(&["id", "status"])
                .set("status", Some(FieldValue::Enum("ACTIVE")))
                .set("fee_amount", Some(125.5))
                .set("auto_renew", Some(false))
                .set("notes", Some("renewed early"))
                .build_at(&id(), now())
        };

        let stmt = statement(build());
        assert_eq!(
            stmt.sql,
            "UPDATE licenses SET status = $1, fee_amount = $2, auto_renew = $3, notes = $4, \
             updated_at = $5 WHERE id = $6 RETURNING id, status"
        );
        assert_eq!(stmt.params.len(), 6);
        assert_eq!(stmt.bind().len(), 6);
        assert_eq!(build(), UpdatePlan::Statement(stmt));
    }

    #[test]
    fn test_param_encoding() {
        let mut out = BytesMut::new();
        let label = SqlParam::Value(FieldValue::Enum("EXPIRED"));
        assert!(matches!(label.to_sql(&Type::TEXT, &mut out), Ok(IsNull::No)));
        assert_eq!(&out[..], b"EXPIRED");

        let mut out = BytesMut::new();
        let key = SqlParam::Key(id().into_inner());
        assert!(key.to_sql(&Type::UUID, &mut out).is_ok());
        assert_eq!(out.len(), 16);

        let mut out = BytesMut::new();
        let bad_key = SqlParam::Key("not-a-uuid".to_string());
        assert!(bad_key.to_sql(&Type::UUID, &mut out).is_err());

        let mut out = BytesMut::new();
        let fee = SqlParam::Value(FieldValue::Float(250.5));
        assert!(fee.to_sql(&Type::NUMERIC, &mut out).is_ok());
        let decoded = <Decimal as tokio_postgres::types::FromSql>::from_sql(&Type::NUMERIC, &out)
            .unwrap();
        assert_eq!(decoded, Decimal::new(2505, 1));

        let mut out = BytesMut::new();
        assert!(
            SqlParam::Value(FieldValue::Float(f64::NAN))
                .to_sql(&Type::NUMERIC, &mut out)
                .is_err()
        );

        let mut out = BytesMut::new();
        let float_into_text = SqlParam::Value(FieldValue::Float(1.0));
        assert!(float_into_text.to_sql(&Type::TEXT, &mut out).is_err());
    }
}
