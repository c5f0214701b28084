pub mod connection;
pub mod row;
pub mod store;
pub mod update;

pub use connection::*;
pub use row::{
    ColumnError, Entity, MappingError, RowReader, SqlRow, SqlValue, ValueRow, format_timestamp,
    map_optional, parse_postgres_array, zero_timestamp,
};
pub use store::{Store, StoreError, UpdateOutcome};
pub use update::{FieldValue, SqlParam, UpdateBuilder, UpdatePlan, UpdateStatement};
