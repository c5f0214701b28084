use serde::{Deserialize, Serialize};

use crate::db::{Entity, MappingError, RowReader, SqlRow};

/// Business entity that holds licenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub business_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Entity for Business {
    const TABLE: &'static str = "businesses";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "type",
        "description",
        "owner_id",
        "created_at",
        "updated_at",
    ];

    fn from_row<R: SqlRow + ?Sized>(row: &R) -> Result<Self, MappingError> {
        let mut r = RowReader::new(row, Self::COLUMNS)?;
        let business = Business {
            id: r.required_text()?,
            name: r.required_text()?,
            business_type: r.required_text()?,
            description: r.optional_text()?,
            owner_id: r.required_text()?,
            created_at: r.required_timestamp()?,
            updated_at: r.optional_timestamp()?,
        };
        r.finish()?;
        Ok(business)
    }
}
