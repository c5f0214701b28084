//! Store access over the shared connection pool.
//!
//! Each call checks out a pooled connection and runs exactly one statement.
//! There are no explicit transactions, retries or read-before-write checks;
//! concurrent writes to a row are ordered by PostgreSQL.

use std::fmt;

use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tracing::error;

use crate::db::row::{Entity, MappingError, map_optional};
use crate::db::update::{SqlParam, UpdateBuilder, UpdatePlan};
use crate::model::User;
use crate::types::{EntityId, SubjectId};

/// Store errors.
#[derive(Debug)]
pub enum StoreError {
    /// No connection could be checked out.
    Pool(String),
    /// The statement failed.
    Query(tokio_postgres::Error),
    /// A returned row did not match the entity shape.
    Mapping(MappingError),
    /// An update statement matched no row.
    NotFound { table: &'static str, id: EntityId },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool(msg) => write!(f, "Connection pool error: {}", msg),
            Self::Query(e) => write!(f, "Query failed: {}", e),
            Self::Mapping(e) => write!(f, "Row mapping failed: {}", e),
            Self::NotFound { table, id } => write!(f, "No row in {} with id {}", table, id),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Query(e) => Some(e),
            Self::Mapping(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Query(e)
    }
}

impl From<MappingError> for StoreError {
    fn from(e: MappingError) -> Self {
        error!("Row mapping failed: {}", e);
        Self::Mapping(e)
    }
}

/// Outcome of applying a partial update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<E> {
    /// The row as it is after the update.
    Updated(E),
    /// No fields were supplied; the store was not contacted.
    NoOp,
}

fn select_by_id<E: Entity>() -> String {
    format!(
        "SELECT {} FROM {} WHERE id = $1",
        E::select_list(),
        E::TABLE
    )
}

/// Handle to the relational store.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.client().await?.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Run `sql` and map at most one row. No row is `Ok(None)`.
    async fn fetch_optional<E: Entity>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<E>, StoreError> {
        let client = self.client().await?;
        let stmt = client.prepare_cached(sql).await?;
        let row = client.query_opt(&stmt, params).await?;
        Ok(map_optional(row.as_ref())?)
    }

    /// Load an entity by primary key.
    pub async fn find_by_id<E: Entity>(&self, id: &EntityId) -> Result<Option<E>, StoreError> {
        let key = SqlParam::Key(id.as_str().to_string());
        self.fetch_optional(&select_by_id::<E>(), &[&key]).await
    }

    /// Load the user row linked to an identity-provider subject.
    pub async fn find_user_by_subject(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE firebase_uid = $1",
            User::select_list(),
            User::TABLE
        );
        self.fetch_optional(&sql, &[&subject.as_str()]).await
    }

    /// Apply a partial update built for row `id` and return the updated row.
    pub async fn apply_update<E: Entity>(
        &self,
        id: &EntityId,
        update: UpdateBuilder,
    ) -> Result<UpdateOutcome<E>, StoreError> {
        let stmt = match update.build(id) {
            UpdatePlan::NoOp => return Ok(UpdateOutcome::NoOp),
            UpdatePlan::Statement(stmt) => stmt,
        };

        let client = self.client().await?;
        let row = client.query_opt(&stmt.sql, &stmt.bind()).await?;
        match map_optional::<E, _>(row.as_ref())? {
            Some(entity) => Ok(UpdateOutcome::Updated(entity)),
            None => Err(StoreError::NotFound {
                table: E::TABLE,
                id: id.clone(),
            }),
        }
    }
}
