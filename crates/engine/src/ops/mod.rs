use std::time::Duration;

use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, SqlErr,
};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, lock, tags};

mod accounts;
mod categories;
mod transactions;
mod users;

pub use accounts::AccountFilter;
pub use categories::{CategoryFilter, CategoryNode};
pub use transactions::{NewTransaction, TransactionFilter};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    default_page_size: u64,
    lock_timeout: Duration,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub(crate) fn page_size(&self, limit: Option<u64>) -> u64 {
        limit.unwrap_or(self.default_page_size)
    }

    pub(crate) async fn require_user(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: Uuid,
    ) -> ResultEngine<crate::users::Model> {
        crate::users::Entity::find_by_id(user_id)
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::NotFound("user not exists".to_string()))
    }

    /// Tags attached to one owning row, sorted for stable output.
    pub async fn tags_of(&self, owner: tags::TagOwner, owner_id: Uuid) -> ResultEngine<Vec<String>> {
        let rows = tags::Entity::find()
            .filter(tags::Column::OwnerKind.eq(owner.as_str()))
            .filter(tags::Column::OwnerId.eq(owner_id))
            .all(&self.database)
            .await?;
        let mut names: Vec<String> = rows.into_iter().map(|row| row.tag).collect();
        names.sort();
        Ok(names)
    }
}

/// Translate a storage integrity violation into a domain conflict.
///
/// Uniqueness is enforced by the storage engine; a concurrent writer is
/// detected here, at the point the engine reports it, never predicted.
pub(crate) fn map_integrity(err: DbErr, what: &str) -> EngineError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            tracing::debug!(what, "unique constraint violated");
            EngineError::Conflict(format!("{what} already exists"))
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            EngineError::Conflict(format!("{what} references a missing row"))
        }
        _ => EngineError::Database(err),
    }
}

pub(crate) async fn insert_tags(
    db_tx: &DatabaseTransaction,
    owner: tags::TagOwner,
    owner_id: Uuid,
    tag_names: &[String],
) -> ResultEngine<()> {
    for tag in tag_names {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row = tags::ActiveModel {
            id: ActiveValue::NotSet,
            owner_kind: ActiveValue::Set(owner.as_str().to_string()),
            owner_id: ActiveValue::Set(owner_id),
            tag: ActiveValue::Set(trimmed.to_string()),
        };
        row.insert(db_tx)
            .await
            .map_err(|err| map_integrity(err, "tag"))?;
    }
    Ok(())
}

pub(crate) async fn replace_tags(
    db_tx: &DatabaseTransaction,
    owner: tags::TagOwner,
    owner_id: Uuid,
    tag_names: &[String],
) -> ResultEngine<()> {
    delete_tags(db_tx, owner, owner_id).await?;
    insert_tags(db_tx, owner, owner_id, tag_names).await
}

pub(crate) async fn delete_tags(
    db_tx: &DatabaseTransaction,
    owner: tags::TagOwner,
    owner_id: Uuid,
) -> ResultEngine<()> {
    tags::Entity::delete_many()
        .filter(tags::Column::OwnerKind.eq(owner.as_str()))
        .filter(tags::Column::OwnerId.eq(owner_id))
        .exec(db_tx)
        .await?;
    Ok(())
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: DatabaseConnection,
    default_page_size: u64,
    lock_timeout: Duration,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            default_page_size: 100,
            lock_timeout: lock::DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Page size used when a listing caller does not set a limit.
    pub fn default_page_size(mut self, limit: u64) -> EngineBuilder {
        self.default_page_size = limit;
        self
    }

    /// Upper bound on advisory-lock waits.
    pub fn lock_timeout(mut self, timeout: Duration) -> EngineBuilder {
        self.lock_timeout = timeout;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            default_page_size: self.default_page_size,
            lock_timeout: self.lock_timeout,
        })
    }
}
