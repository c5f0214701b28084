use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Entity, MappingError, RowReader, SqlRow, UpdateBuilder};
use crate::model::{EntityPatch, LicenseStatus};

/// License issued to a business by a regulatory authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub id: String,
    pub business_id: String,
    pub jurisdiction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    pub license_number: String,
    pub license_type: String,
    pub status: LicenseStatus,
    pub issued_date: String,
    pub expiration_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Entity for License {
    const TABLE: &'static str = "licenses";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "business_id",
        "jurisdiction_id",
        "location_id",
        "license_number",
        "type",
        "status",
        "issued_date",
        "expiration_date",
        "renewal_date",
        "fee_amount",
        "notes",
        "created_at",
        "updated_at",
    ];

    fn from_row<R: SqlRow + ?Sized>(row: &R) -> Result<Self, MappingError> {
        let mut r = RowReader::new(row, Self::COLUMNS)?;
        let license = License {
            id: r.required_text()?,
            business_id: r.required_text()?,
            jurisdiction_id: r.required_text()?,
            location_id: r.optional_text()?,
            license_number: r.required_text()?,
            license_type: r.required_text()?,
            status: r.required_parsed()?,
            issued_date: r.required_timestamp()?,
            expiration_date: r.required_timestamp()?,
            renewal_date: r.optional_timestamp()?,
            fee_amount: r.optional_float()?,
            notes: r.optional_text()?,
            created_at: r.required_timestamp()?,
            updated_at: r.optional_timestamp()?,
        };
        r.finish()?;
        Ok(license)
    }
}

/// Patch for a license. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseUpdate {
    pub license_number: Option<String>,
    pub status: Option<LicenseStatus>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub renewal_date: Option<DateTime<Utc>>,
    pub fee_amount: Option<f64>,
    pub notes: Option<String>,
}

impl EntityPatch for LicenseUpdate {
    type Entity = License;

    fn to_update(&self) -> UpdateBuilder {
        UpdateBuilder::new(License::TABLE)
            .returning(License::COLUMNS)
            .set("license_number", self.license_number.clone())
            .set("status", self.status)
            .set("expiration_date", self.expiration_date)
            .set("renewal_date", self.renewal_date)
            .set("fee_amount", self.fee_amount)
            .set("notes", self.notes.clone())
    }
}
