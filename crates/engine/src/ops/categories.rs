use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, DatabaseTransaction, EntityTrait,
    QueryFilter, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Category, CategoryStatus, EngineError, ResultEngine, categories, cursor, lock,
    query::{QueryPart, SortDirection, TagMatch, compose, in_condition, tags_condition},
    repository::{KeyFilter, Repository, in_for_arrays},
    tags::TagOwner,
    util::{normalize_display, normalize_key, normalize_optional_text},
};

use super::{Engine, insert_tags, map_integrity, with_tx};

/// All reparents of one owner serialize on this lock. The ancestor walk
/// takes no per-row locks, so two concurrent reparents of the same owner
/// could otherwise race past each other's cycle checks before either
/// commits.
const REPARENT_LOCK: &str = "category-reparent";

/// Typed filters accepted by the category listings.
#[derive(Clone, Debug)]
pub enum CategoryFilter {
    Ids(Vec<Uuid>),
    Statuses(Vec<CategoryStatus>),
    /// Direct children of a parent; `None` selects the roots.
    Parent(Option<Uuid>),
    Tags { tags: Vec<String>, mode: TagMatch },
}

impl CategoryFilter {
    fn into_part(self) -> ResultEngine<QueryPart<categories::Entity>> {
        Ok(match self {
            Self::Ids(ids) => QueryPart::Predicate(in_condition(categories::Column::Id, ids)),
            Self::Statuses(statuses) => QueryPart::Predicate(in_condition(
                categories::Column::Status,
                statuses.iter().map(|status| status.as_str()).collect(),
            )),
            Self::Parent(Some(parent_id)) => QueryPart::Predicate(
                Condition::all().add(categories::Column::ParentId.eq(parent_id)),
            ),
            Self::Parent(None) => QueryPart::Predicate(
                Condition::all().add(categories::Column::ParentId.is_null()),
            ),
            Self::Tags { tags, mode } => QueryPart::Predicate(tags_condition(
                TagOwner::Category,
                (categories::Entity, categories::Column::Id),
                &tags,
                mode,
            )),
        })
    }
}

/// One node of the category tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Pagination order of category listings.
const CATEGORY_ORDER: [(categories::Column, SortDirection); 1] =
    [(categories::Column::Id, SortDirection::Desc)];

fn category_repo() -> Repository<categories::Entity> {
    Repository::new([categories::Column::Id]).with_handler(in_for_arrays::<categories::Entity>)
}

fn build_tree(
    parent_id: Option<Uuid>,
    by_parent: &mut HashMap<Option<Uuid>, Vec<Category>>,
) -> Vec<CategoryNode> {
    let mut nodes = Vec::new();
    for category in by_parent.remove(&parent_id).unwrap_or_default() {
        let children = build_tree(Some(category.id), by_parent);
        nodes.push(CategoryNode { category, children });
    }
    nodes
}

impl Engine {
    pub async fn create_category(
        &self,
        user_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
        description: Option<&str>,
        tag_names: &[String],
    ) -> ResultEngine<Category> {
        let display = normalize_display(name, "category")?;
        let name_norm = normalize_key(&display, "category")?;
        with_tx!(self, |db_tx| {
            self.require_user(&db_tx, user_id).await?;
            if let Some(parent_id) = parent_id {
                match self.require_category(&db_tx, user_id, parent_id).await {
                    Ok(_) => {}
                    Err(EngineError::NotFound(_)) => {
                        return Err(EngineError::NotFound(
                            "parent category not exists".to_string(),
                        ));
                    }
                    Err(err) => return Err(err),
                }
            }

            let now = Utc::now();
            let category = Category {
                id: Uuid::new_v4(),
                user_id,
                name: display,
                description: normalize_optional_text(description),
                status: CategoryStatus::Active,
                parent_id,
                created: now,
                updated: now,
            };
            let mut active = categories::ActiveModel::from(&category);
            active.name_norm = ActiveValue::Set(name_norm);
            active
                .insert(&db_tx)
                .await
                .map_err(|err| map_integrity(err, "category"))?;
            insert_tags(&db_tx, TagOwner::Category, category.id, tag_names).await?;
            Ok(category)
        })
    }

    pub async fn update_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        status: Option<CategoryStatus>,
    ) -> ResultEngine<Category> {
        with_tx!(self, |db_tx| {
            self.require_category(&db_tx, user_id, category_id).await?;

            let mut active = categories::ActiveModel {
                id: ActiveValue::Set(category_id),
                updated: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            if let Some(name) = name {
                let display = normalize_display(name, "category")?;
                active.name_norm = ActiveValue::Set(normalize_key(&display, "category")?);
                active.name = ActiveValue::Set(display);
            }
            if let Some(description) = description {
                active.description = ActiveValue::Set(normalize_optional_text(Some(description)));
            }
            if let Some(status) = status {
                active.status = ActiveValue::Set(status.as_str().to_string());
            }
            let updated = active
                .update(&db_tx)
                .await
                .map_err(|err| map_integrity(err, "category"))?;
            Category::try_from(updated)
        })
    }

    /// Move a category under a new parent, or detach it with `None`.
    ///
    /// The candidate parent's ancestor chain is walked upward inside the
    /// transaction; an attempt to attach a category below itself, across
    /// owners, or onto a broken chain is rejected. All reparents of one
    /// owner serialize on an advisory lock for the duration of the
    /// transaction.
    pub async fn change_category_parent(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> ResultEngine<Category> {
        with_tx!(self, |db_tx| {
            lock::acquire(
                &db_tx,
                &lock::scoped(REPARENT_LOCK, user_id),
                self.lock_timeout,
            )
            .await?;

            let category = categories::Entity::find()
                .filter(categories::Column::Id.eq(category_id))
                .filter(categories::Column::UserId.eq(user_id))
                .lock_exclusive()
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("category not exists".to_string()))?;

            if let Some(parent_id) = parent_id {
                self.guard_against_cycle(&db_tx, user_id, category.id, parent_id)
                    .await?;
            }

            let active = categories::ActiveModel {
                id: ActiveValue::Set(category_id),
                parent_id: ActiveValue::Set(parent_id),
                updated: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            let updated = active
                .update(&db_tx)
                .await
                .map_err(|err| map_integrity(err, "category"))?;
            Category::try_from(updated)
        })
    }

    /// Walk upward from the candidate parent and reject anything that would
    /// corrupt the hierarchy.
    async fn guard_against_cycle(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: Uuid,
        category_id: Uuid,
        parent_id: Uuid,
    ) -> ResultEngine<()> {
        if parent_id == category_id {
            return Err(EngineError::Cycle(
                "category cannot be its own parent".to_string(),
            ));
        }

        let mut current = match self.require_category(db_tx, user_id, parent_id).await {
            Ok(model) => model,
            Err(EngineError::NotFound(_)) => {
                return Err(EngineError::NotFound(
                    "parent category not exists".to_string(),
                ));
            }
            Err(err) => return Err(err),
        };

        // Each step depends on the previous row, so the walk is sequential;
        // it is bounded by the tree depth.
        while let Some(ancestor_id) = current.parent_id {
            if ancestor_id == category_id {
                tracing::warn!(%category_id, %parent_id, "reparent rejected: cycle");
                return Err(EngineError::Cycle(
                    "cyclic category hierarchies are not allowed".to_string(),
                ));
            }
            current = match self.require_category(db_tx, user_id, ancestor_id).await {
                Ok(model) => model,
                // A chain that leaves the owner or dangles is corrupt;
                // reject instead of ignoring it.
                Err(EngineError::NotFound(_)) => {
                    tracing::warn!(%category_id, %ancestor_id, "reparent rejected: broken chain");
                    return Err(EngineError::Cycle(
                        "category chain crosses owners or is broken".to_string(),
                    ));
                }
                Err(err) => return Err(err),
            };
        }
        Ok(())
    }

    pub async fn category(&self, user_id: Uuid, category_id: Uuid) -> ResultEngine<Category> {
        let model = category_repo()
            .load_by(
                &self.database,
                vec![
                    KeyFilter::new("id", category_id),
                    KeyFilter::new("user_id", user_id),
                ],
            )
            .await?
            .ok_or_else(|| EngineError::NotFound("category not exists".to_string()))?;
        Category::try_from(model)
    }

    /// Cursor-paginated category listing, newest id first.
    pub async fn list_categories_page(
        &self,
        user_id: Uuid,
        filters: Vec<CategoryFilter>,
        limit: Option<u64>,
        cursor: Option<&str>,
    ) -> ResultEngine<(Vec<Category>, Option<String>)> {
        let parts = filters
            .into_iter()
            .map(CategoryFilter::into_part)
            .collect::<ResultEngine<Vec<_>>>()?;
        let select = compose(
            categories::Entity::find().filter(categories::Column::UserId.eq(user_id)),
            parts,
        );
        let (rows, next_cursor) = cursor::page(
            &self.database,
            select,
            &CATEGORY_ORDER,
            self.page_size(limit),
            cursor,
        )
        .await?;
        let items = rows
            .into_iter()
            .map(Category::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        Ok((items, next_cursor))
    }

    /// The active categories of a user as a parent/child tree.
    ///
    /// Children of a disabled category are unreachable from the roots and
    /// are left out, matching the flat listing under a `Statuses` filter.
    pub async fn category_tree(&self, user_id: Uuid) -> ResultEngine<Vec<CategoryNode>> {
        let select = categories::Entity::find()
            .filter(categories::Column::UserId.eq(user_id))
            .filter(categories::Column::Status.eq(CategoryStatus::Active.as_str()));
        let rows = category_repo().list_full(&self.database, select).await?;

        let mut by_parent: HashMap<Option<Uuid>, Vec<Category>> = HashMap::new();
        for model in rows {
            let category = Category::try_from(model)?;
            by_parent.entry(category.parent_id).or_default().push(category);
        }
        for children in by_parent.values_mut() {
            children.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(build_tree(None, &mut by_parent))
    }

    pub(super) async fn require_category(
        &self,
        db_tx: &DatabaseTransaction,
        user_id: Uuid,
        category_id: Uuid,
    ) -> ResultEngine<categories::Model> {
        categories::Entity::find()
            .filter(categories::Column::Id.eq(category_id))
            .filter(categories::Column::UserId.eq(user_id))
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::NotFound("category not exists".to_string()))
    }
}
