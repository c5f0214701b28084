use serde::{Deserialize, Serialize};

use crate::db::{Entity, MappingError, RowReader, SqlRow, UpdateBuilder};
use crate::model::EntityPatch;

/// In-app notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_entity_type: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Entity for Notification {
    const TABLE: &'static str = "notifications";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "title",
        "message",
        "type",
        "is_read",
        "related_entity_id",
        "related_entity_type",
        "created_at",
        "updated_at",
    ];

    fn from_row<R: SqlRow + ?Sized>(row: &R) -> Result<Self, MappingError> {
        let mut r = RowReader::new(row, Self::COLUMNS)?;
        let notification = Notification {
            id: r.required_text()?,
            user_id: r.required_text()?,
            title: r.required_text()?,
            message: r.required_text()?,
            notification_type: r.required_text()?,
            is_read: r.required_bool()?,
            related_entity_id: r.optional_text()?,
            related_entity_type: r.optional_text()?,
            created_at: r.required_timestamp()?,
            updated_at: r.optional_timestamp()?,
        };
        r.finish()?;
        Ok(notification)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationUpdate {
    pub is_read: Option<bool>,
}

impl EntityPatch for NotificationUpdate {
    type Entity = Notification;

    fn to_update(&self) -> UpdateBuilder {
        UpdateBuilder::new(Notification::TABLE)
            .returning(Notification::COLUMNS)
            .set("is_read", self.is_read)
    }
}
