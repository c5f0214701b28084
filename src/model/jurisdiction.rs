use serde::{Deserialize, Serialize};

use crate::db::{Entity, MappingError, RowReader, SqlRow};

/// Regulatory jurisdiction (state, province or municipality).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jurisdiction {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub jurisdiction_type: String,
    pub country: String,
    pub regulatory_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulatory_website: Option<String>,
    /// License types the jurisdiction issues. Empty when none are recorded.
    pub license_types: Vec<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Entity for Jurisdiction {
    const TABLE: &'static str = "jurisdictions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "type",
        "country",
        "regulatory_body",
        "regulatory_website",
        "license_types",
        "created_at",
        "updated_at",
    ];

    fn from_row<R: SqlRow + ?Sized>(row: &R) -> Result<Self, MappingError> {
        let mut r = RowReader::new(row, Self::COLUMNS)?;
        let jurisdiction = Jurisdiction {
            id: r.required_text()?,
            name: r.required_text()?,
            jurisdiction_type: r.required_text()?,
            country: r.required_text()?,
            regulatory_body: r.required_text()?,
            regulatory_website: r.optional_text()?,
            license_types: r.text_array()?,
            created_at: r.required_timestamp()?,
            updated_at: r.optional_timestamp()?,
        };
        r.finish()?;
        Ok(jurisdiction)
    }
}
