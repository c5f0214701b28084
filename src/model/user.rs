use serde::{Deserialize, Serialize};

use crate::db::{Entity, MappingError, RowReader, SqlRow, UpdateBuilder};
use crate::model::EntityPatch;

/// User account linked to an identity-provider subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub role: String,
    pub firebase_uid: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "email",
        "first_name",
        "last_name",
        "role",
        "firebase_uid",
        "created_at",
        "updated_at",
    ];

    fn from_row<R: SqlRow + ?Sized>(row: &R) -> Result<Self, MappingError> {
        let mut r = RowReader::new(row, Self::COLUMNS)?;
        let user = User {
            id: r.required_text()?,
            email: r.required_text()?,
            first_name: r.optional_text()?,
            last_name: r.optional_text()?,
            role: r.required_text()?,
            firebase_uid: r.optional_text()?,
            created_at: r.required_timestamp()?,
            updated_at: r.optional_timestamp()?,
        };
        r.finish()?;
        Ok(user)
    }
}

/// Self-service profile patch. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl EntityPatch for UserUpdate {
    type Entity = User;

    fn to_update(&self) -> UpdateBuilder {
        UpdateBuilder::new(User::TABLE)
            .returning(User::COLUMNS)
            .set("first_name", self.first_name.clone())
            .set("last_name", self.last_name.clone())
    }
}
