use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Entity, MappingError, RowReader, SqlRow, UpdateBuilder};
use crate::model::{ComplianceStatus, EntityPatch};

/// Scheduled or completed compliance check against a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheck {
    pub id: String,
    pub license_id: String,
    /// Kind of check, stored as `check_type`.
    pub title: String,
    pub status: ComplianceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<String>,
    /// Next scheduled check, stored as `next_check_date`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_by_id: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Entity for ComplianceCheck {
    const TABLE: &'static str = "compliance_checks";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "license_id",
        "check_type",
        "status",
        "checked_at",
        "next_check_date",
        "notes",
        "checked_by_id",
        "created_at",
        "updated_at",
    ];

    fn from_row<R: SqlRow + ?Sized>(row: &R) -> Result<Self, MappingError> {
        let mut r = RowReader::new(row, Self::COLUMNS)?;
        let check = ComplianceCheck {
            id: r.required_text()?,
            license_id: r.required_text()?,
            title: r.required_text()?,
            status: r.required_parsed()?,
            checked_at: r.optional_timestamp()?,
            due_date: r.optional_timestamp()?,
            notes: r.optional_text()?,
            checked_by_id: r.optional_text()?,
            created_at: r.required_timestamp()?,
            updated_at: r.optional_timestamp()?,
        };
        r.finish()?;
        Ok(check)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheckUpdate {
    pub status: Option<ComplianceStatus>,
    pub notes: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

impl EntityPatch for ComplianceCheckUpdate {
    type Entity = ComplianceCheck;

    fn to_update(&self) -> UpdateBuilder {
        UpdateBuilder::new(ComplianceCheck::TABLE)
            .returning(ComplianceCheck::COLUMNS)
            .set("status", self.status)
            .set("notes", self.notes.clone())
            .set("checked_at", self.checked_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FieldValue, SqlParam, SqlValue, UpdatePlan, ValueRow};
    use crate::types::EntityId;
    use chrono::TimeZone;

    #[test]
    fn test_compliance_check_from_row() {
        let row = ValueRow(vec![
            SqlValue::Text("c-1".to_string()),
            SqlValue::Text("l-1".to_string()),
            SqlValue::Text("Security audit".to_string()),
            SqlValue::Text("NEEDS_ATTENTION".to_string()),
            SqlValue::Null,
            SqlValue::Timestamp(Utc.with_ymd_and_hms(2024, 9, 30, 0, 0, 0).unwrap()),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            SqlValue::Null,
        ]);
        let check = ComplianceCheck::from_row(&row).unwrap();

        assert_eq!(check.title, "Security audit");
        assert_eq!(check.status, ComplianceStatus::NeedsAttention);
        assert_eq!(check.due_date.as_deref(), Some("2024-09-30T00:00:00Z"));
        assert_eq!(check.checked_at, None);
        assert_eq!(check.created_at, "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_short_row_is_column_count_error() {
        let row = ValueRow(vec![SqlValue::Text("c-1".to_string())]);
        assert_eq!(
            ComplianceCheck::from_row(&row),
            Err(MappingError::ColumnCount {
                expected: 10,
                found: 1
            })
        );
    }

    #[test]
    fn test_compliance_update_binds_status_label() {
        let patch: ComplianceCheckUpdate =
            serde_json::from_str(r#"{ "status": "NON_COMPLIANT" }"#).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let UpdatePlan::Statement(stmt) = patch.to_update().build_at(&EntityId::new("c-1"), now)
        else {
            panic!("expected a statement");
        };
        assert!(stmt.sql.starts_with(
            "UPDATE compliance_checks SET status = $1, updated_at = $2 WHERE id = $3"
        ));
        assert_eq!(
            stmt.params[0],
            SqlParam::Value(FieldValue::Enum("NON_COMPLIANT"))
        );
    }
}
