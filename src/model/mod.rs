//! Domain entities and their row mappings.
//!
//! Each entity declares its table and column order through
//! [`Entity`](crate::db::Entity); patch types turn client input into an
//! [`UpdateBuilder`](crate::db::UpdateBuilder).

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::db::{Entity, UpdateBuilder};

mod business;
mod compliance;
mod jurisdiction;
mod license;
mod notification;
mod status;
mod user;

pub use business::Business;
pub use compliance::{ComplianceCheck, ComplianceCheckUpdate};
pub use jurisdiction::Jurisdiction;
pub use license::{License, LicenseUpdate};
pub use notification::{Notification, NotificationUpdate};
pub use status::{ComplianceStatus, LicenseStatus, UnknownLabel};
pub use user::{User, UserUpdate};

/// Client-supplied partial update for one entity type.
pub trait EntityPatch: DeserializeOwned + Send + 'static {
    type Entity: Entity + Serialize + Send + 'static;

    /// Builder holding only the fields the client supplied, in declared order.
    fn to_update(&self) -> UpdateBuilder;
}
