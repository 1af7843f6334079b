use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, JoinType, QueryFilter, QuerySelect,
    RelationTrait, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, Transaction, categories, cursor,
    query::{QueryPart, SortDirection, TagMatch, compose, in_condition, range_condition, tags_condition},
    repository::{KeyFilter, Repository, in_for_arrays},
    tags::TagOwner,
    transactions,
    util::{normalize_key, normalize_optional_text},
};

use super::{Engine, delete_tags, insert_tags, map_integrity, with_tx};

/// Input of [`Engine::create_transaction`].
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub occurred_on: NaiveDate,
    pub description: Option<String>,
    pub account_id: Uuid,
    pub category_id: Uuid,
    /// Signed: positive is income, negative is expense.
    pub amount_minor: i64,
    pub tags: Vec<String>,
}

/// Typed filters accepted by the transaction listings.
#[derive(Clone, Debug)]
pub enum TransactionFilter {
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    AmountRange {
        from_minor: Option<i64>,
        to_minor: Option<i64>,
    },
    Accounts(Vec<Uuid>),
    Categories(Vec<Uuid>),
    Tags { tags: Vec<String>, mode: TagMatch },
    /// Restrict to one category by its (normalized) name; joins the
    /// categories table into the statement.
    CategoryNamed(String),
}

impl TransactionFilter {
    fn into_part(self) -> ResultEngine<QueryPart<transactions::Entity>> {
        Ok(match self {
            Self::DateRange { from, to } => QueryPart::Predicate(range_condition(
                transactions::Column::OccurredOn,
                from,
                to,
            )),
            Self::AmountRange {
                from_minor,
                to_minor,
            } => QueryPart::Predicate(range_condition(
                transactions::Column::AmountMinor,
                from_minor,
                to_minor,
            )),
            Self::Accounts(ids) => {
                QueryPart::Predicate(in_condition(transactions::Column::AccountId, ids))
            }
            Self::Categories(ids) => {
                QueryPart::Predicate(in_condition(transactions::Column::CategoryId, ids))
            }
            Self::Tags { tags, mode } => QueryPart::Predicate(tags_condition(
                TagOwner::Transaction,
                (transactions::Entity, transactions::Column::Id),
                &tags,
                mode,
            )),
            Self::CategoryNamed(name) => {
                let name_norm = normalize_key(&name, "category")?;
                QueryPart::statement(move |select| {
                    select
                        .join(JoinType::InnerJoin, transactions::Relation::Category.def())
                        .filter(categories::Column::NameNorm.eq(name_norm))
                })
            }
        })
    }
}

/// Pagination order of transaction listings: newest day first, ties broken
/// by id so the composite order is total.
const TRANSACTION_ORDER: [(transactions::Column, SortDirection); 2] = [
    (transactions::Column::OccurredOn, SortDirection::Desc),
    (transactions::Column::Id, SortDirection::Desc),
];

fn transaction_repo() -> Repository<transactions::Entity> {
    Repository::new([transactions::Column::Id])
        .with_handler(in_for_arrays::<transactions::Entity>)
}

impl Engine {
    /// Record a movement and apply it to the account's denormalized
    /// balance; the account row stays locked until commit.
    pub async fn create_transaction(
        &self,
        user_id: Uuid,
        new: NewTransaction,
    ) -> ResultEngine<Transaction> {
        if new.amount_minor == 0 {
            return Err(EngineError::InvalidAmount(
                "amount_minor must not be 0".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            let account = self
                .require_account_write(&db_tx, user_id, new.account_id)
                .await?;
            self.require_category(&db_tx, user_id, new.category_id).await?;

            let tx = Transaction {
                id: Uuid::new_v4(),
                user_id,
                occurred_on: new.occurred_on,
                description: normalize_optional_text(new.description.as_deref()),
                account_id: new.account_id,
                category_id: new.category_id,
                amount_minor: new.amount_minor,
                created: Utc::now(),
            };
            transactions::ActiveModel::from(&tx)
                .insert(&db_tx)
                .await
                .map_err(|err| map_integrity(err, "transaction"))?;
            insert_tags(&db_tx, TagOwner::Transaction, tx.id, &new.tags).await?;

            let account_update = crate::accounts::ActiveModel {
                id: ActiveValue::Set(account.id),
                balance_minor: ActiveValue::Set(account.balance_minor + tx.amount_minor),
                updated: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            account_update.update(&db_tx).await?;

            Ok(tx)
        })
    }

    /// Remove a transaction and revert its effect on the account balance.
    pub async fn delete_transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let tx = transactions::Entity::find()
                .filter(transactions::Column::Id.eq(transaction_id))
                .filter(transactions::Column::UserId.eq(user_id))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("transaction not exists".to_string()))?;

            let account = self
                .require_account_write(&db_tx, user_id, tx.account_id)
                .await?;
            let account_update = crate::accounts::ActiveModel {
                id: ActiveValue::Set(account.id),
                balance_minor: ActiveValue::Set(account.balance_minor - tx.amount_minor),
                updated: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            account_update.update(&db_tx).await?;

            delete_tags(&db_tx, TagOwner::Transaction, transaction_id).await?;
            transactions::Entity::delete_by_id(transaction_id)
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }

    pub async fn transaction(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let model = transaction_repo()
            .load_by(
                &self.database,
                vec![
                    KeyFilter::new("id", transaction_id),
                    KeyFilter::new("user_id", user_id),
                ],
            )
            .await?
            .ok_or_else(|| EngineError::NotFound("transaction not exists".to_string()))?;
        Transaction::try_from(model)
    }

    /// Cursor-paginated transaction listing ordered
    /// `(occurred_on DESC, id DESC)`.
    pub async fn list_transactions_page(
        &self,
        user_id: Uuid,
        filters: Vec<TransactionFilter>,
        limit: Option<u64>,
        cursor: Option<&str>,
    ) -> ResultEngine<(Vec<Transaction>, Option<String>)> {
        let parts = filters
            .into_iter()
            .map(TransactionFilter::into_part)
            .collect::<ResultEngine<Vec<_>>>()?;
        let select = compose(
            transactions::Entity::find().filter(transactions::Column::UserId.eq(user_id)),
            parts,
        );
        let (rows, next_cursor) = cursor::page(
            &self.database,
            select,
            &TRANSACTION_ORDER,
            self.page_size(limit),
            cursor,
        )
        .await?;
        let items = rows
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        Ok((items, next_cursor))
    }
}
