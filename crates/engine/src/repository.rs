//! Entity-agnostic load/list/exists access.
//!
//! A `Repository` is configured once per entity with its primary-key
//! column(s) and an ordered pipeline of filter handlers. `load_by` filters
//! flow through the handlers first; each handler is a pure function that
//! returns the condition it consumed plus the filters it left alone, and
//! whatever survives the pipeline falls through to exact equality on the
//! like-named column.

use std::str::FromStr;

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect, Select, Value,
};

use crate::{EngineError, ResultEngine};

/// A named filter argument of `load_by`/`exists`.
#[derive(Clone, Debug)]
pub struct KeyFilter {
    pub key: String,
    pub value: FilterValue,
}

#[derive(Clone, Debug)]
pub enum FilterValue {
    One(Value),
    Many(Vec<Value>),
}

impl KeyFilter {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: FilterValue::One(value.into()),
        }
    }

    pub fn many<V: Into<Value>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            key: key.into(),
            value: FilterValue::Many(values.into_iter().map(Into::into).collect()),
        }
    }
}

/// One stage of the filter pipeline: `(remaining) -> (consumed, remaining)`.
pub type FilterHandler = fn(Vec<KeyFilter>) -> (Condition, Vec<KeyFilter>);

/// Rewrites any list-valued filter naming a column of `E` into an `IN`
/// condition; everything else passes through untouched.
pub fn in_for_arrays<E: EntityTrait>(filters: Vec<KeyFilter>) -> (Condition, Vec<KeyFilter>) {
    let mut consumed = Condition::all();
    let mut remaining = Vec::with_capacity(filters.len());
    for filter in filters {
        if let FilterValue::Many(values) = &filter.value
            && let Ok(column) = E::Column::from_str(&filter.key)
        {
            consumed = consumed.add(column.is_in(values.clone()));
        } else {
            remaining.push(filter);
        }
    }
    (consumed, remaining)
}

pub struct Repository<E: EntityTrait> {
    key_columns: Vec<E::Column>,
    handlers: Vec<FilterHandler>,
}

impl<E: EntityTrait> Repository<E> {
    pub fn new(key_columns: impl IntoIterator<Item = E::Column>) -> Self {
        Self {
            key_columns: key_columns.into_iter().collect(),
            handlers: Vec::new(),
        }
    }

    /// Append a handler; handlers run in registration order.
    pub fn with_handler(mut self, handler: FilterHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    fn key_condition(&self, key: &[Value]) -> ResultEngine<Condition> {
        if key.len() != self.key_columns.len() {
            return Err(EngineError::Arity {
                expected: self.key_columns.len(),
                got: key.len(),
            });
        }
        let mut condition = Condition::all();
        for (column, value) in self.key_columns.iter().zip(key) {
            condition = condition.add(column.eq(value.clone()));
        }
        Ok(condition)
    }

    fn render(&self, filters: Vec<KeyFilter>) -> ResultEngine<Condition> {
        let mut condition = Condition::all();
        let mut remaining = filters;
        for handler in &self.handlers {
            let (consumed, rest) = handler(remaining);
            condition = condition.add(consumed);
            remaining = rest;
        }
        for filter in remaining {
            let column = E::Column::from_str(&filter.key).map_err(|_| {
                EngineError::InvalidFilter(format!("unknown filter key: {}", filter.key))
            })?;
            condition = condition.add(match filter.value {
                FilterValue::One(value) => column.eq(value),
                FilterValue::Many(values) => column.is_in(values),
            });
        }
        Ok(condition)
    }

    /// Load one row by primary key; `Arity` when the number of supplied
    /// values does not match the configured key.
    pub async fn load<C: ConnectionTrait>(
        &self,
        db: &C,
        key: &[Value],
    ) -> ResultEngine<Option<E::Model>> {
        let condition = self.key_condition(key)?;
        E::find().filter(condition).one(db).await.map_err(Into::into)
    }

    /// Load at most one row matched by the filter pipeline.
    ///
    /// More than one match is a caller bug: the repository fetches two rows
    /// and rejects with `Conflict` rather than silently picking one.
    pub async fn load_by<C: ConnectionTrait>(
        &self,
        db: &C,
        filters: Vec<KeyFilter>,
    ) -> ResultEngine<Option<E::Model>> {
        let condition = self.render(filters)?;
        let rows = E::find().filter(condition).limit(2).all(db).await?;
        if rows.len() > 1 {
            return Err(EngineError::Conflict(
                "load_by matched more than one row".to_string(),
            ));
        }
        Ok(rows.into_iter().next())
    }

    /// Existence check through the same filter pipeline; no row is
    /// materialized.
    pub async fn exists<C: ConnectionTrait>(
        &self,
        db: &C,
        filters: Vec<KeyFilter>,
    ) -> ResultEngine<bool>
    where
        E::Model: Sync,
    {
        let condition = self.render(filters)?;
        Ok(E::find().filter(condition).count(db).await? > 0)
    }

    /// Every matching row, unpaginated. Only for result sets the caller
    /// knows to be bounded.
    pub async fn list_full<C: ConnectionTrait>(
        &self,
        db: &C,
        select: Select<E>,
    ) -> ResultEngine<Vec<E::Model>> {
        select.all(db).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, EntityTrait, QueryFilter, QueryTrait};
    use uuid::Uuid;

    use super::*;
    use crate::accounts;

    fn repo() -> Repository<accounts::Entity> {
        Repository::new([accounts::Column::Id]).with_handler(in_for_arrays::<accounts::Entity>)
    }

    #[test]
    fn key_arity_is_checked() {
        let err = repo().key_condition(&[]).unwrap_err();
        assert_eq!(err, EngineError::Arity { expected: 1, got: 0 });
        assert!(repo().key_condition(&[Uuid::new_v4().into()]).is_ok());
    }

    #[test]
    fn array_filters_become_in_clauses() {
        let condition = repo()
            .render(vec![
                KeyFilter::many("id", [Uuid::new_v4(), Uuid::new_v4()]),
                KeyFilter::new("status", "active"),
            ])
            .unwrap();
        let sql = accounts::Entity::find()
            .filter(condition)
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(sql.contains("IN"));
        assert!(sql.contains("\"status\" ="));
    }

    #[test]
    fn unknown_filter_key_fails_fast() {
        let err = repo()
            .render(vec![KeyFilter::new("no_such_column", 1)])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFilter(_)));
    }

    mod db {
        use migration::MigratorTrait;
        use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection};

        use super::*;
        use crate::tags;

        async fn connect() -> DatabaseConnection {
            let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
            migration::Migrator::up(&db, None).await.unwrap();
            db
        }

        async fn seed_tag(db: &DatabaseConnection, owner_id: Uuid, tag: &str) {
            tags::ActiveModel {
                id: ActiveValue::NotSet,
                owner_kind: ActiveValue::Set("account".to_string()),
                owner_id: ActiveValue::Set(owner_id),
                tag: ActiveValue::Set(tag.to_string()),
            }
            .insert(db)
            .await
            .unwrap();
        }

        fn tag_repo() -> Repository<tags::Entity> {
            // Natural composite key instead of the surrogate id.
            Repository::new([
                tags::Column::OwnerKind,
                tags::Column::OwnerId,
                tags::Column::Tag,
            ])
        }

        #[tokio::test]
        async fn load_checks_arity_against_a_composite_key() {
            let db = connect().await;
            let owner_id = Uuid::new_v4();
            seed_tag(&db, owner_id, "rent").await;

            let err = tag_repo().load(&db, &["account".into()]).await.unwrap_err();
            assert_eq!(err, EngineError::Arity { expected: 3, got: 1 });

            let row = tag_repo()
                .load(&db, &["account".into(), owner_id.into(), "rent".into()])
                .await
                .unwrap()
                .unwrap();
            assert_eq!(row.tag, "rent");

            // Absence is a result, not an error.
            let missing = tag_repo()
                .load(&db, &["account".into(), owner_id.into(), "fun".into()])
                .await
                .unwrap();
            assert!(missing.is_none());
        }

        #[tokio::test]
        async fn load_by_rejects_a_second_match() {
            let db = connect().await;
            let owner_id = Uuid::new_v4();
            seed_tag(&db, owner_id, "rent").await;
            seed_tag(&db, owner_id, "bills").await;

            let filters = || vec![KeyFilter::new("owner_id", owner_id)];
            let err = tag_repo().load_by(&db, filters()).await.unwrap_err();
            assert_eq!(
                err,
                EngineError::Conflict("load_by matched more than one row".to_string())
            );

            assert!(tag_repo().exists(&db, filters()).await.unwrap());
            let one = tag_repo()
                .load_by(&db, vec![
                    KeyFilter::new("owner_id", owner_id),
                    KeyFilter::new("tag", "rent"),
                ])
                .await
                .unwrap();
            assert!(one.is_some());
        }
    }
}
